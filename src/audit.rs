use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub seq: i64,
    pub at: String,
    pub actor: String,
    pub action: String,
    pub report_card_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

pub fn record(
    conn: &Connection,
    actor: &str,
    action: &str,
    report_card_id: Option<&str>,
    details: Option<&serde_json::Value>,
) -> anyhow::Result<()> {
    let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM audit_events", [], |r| {
        r.get(0)
    })?;
    let details_json = details.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO audit_events(id, seq, at, actor, action, report_card_id, details_json)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            seq,
            chrono::Utc::now().to_rfc3339(),
            actor,
            action,
            report_card_id,
            details_json,
        ),
    )?;
    tracing::debug!(actor, action, seq, "audit event recorded");
    Ok(())
}

/// Newest first.
pub fn list(conn: &Connection, limit: i64) -> anyhow::Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, seq, at, actor, action, report_card_id, details_json
         FROM audit_events
         ORDER BY seq DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(id, seq, at, actor, action, report_card_id, details_json)| AuditEvent {
            id,
            seq,
            at,
            actor,
            action,
            report_card_id,
            details: details_json.and_then(|s| serde_json::from_str(&s).ok()),
        })
        .collect())
}
