use crate::grades::SubjectRecord;
use crate::periods::{self, Period, PeriodRegistry};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardHeader {
    pub id: String,
    pub owner_id: String,
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub roll_number: String,
    pub school_name: String,
    pub academic_year: String,
    pub principal_comment: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportCard {
    pub header: ReportCardHeader,
    pub periods: PeriodRegistry,
    pub subjects: Vec<SubjectRecord>,
}

/// Flat document exchanged with outside stores. `periods` is absent in
/// documents written before the registry was stored explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub roll_number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub school_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub academic_year: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub principal_comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<Vec<Period>>,
    #[serde(default)]
    pub grades: Vec<Map<String, Value>>,
}

fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl ReportCard {
    pub fn to_document(&self) -> ReportCardDocument {
        let h = &self.header;
        ReportCardDocument {
            id: h.student_id.clone(),
            name: h.name.clone(),
            class_name: h.class_name.clone(),
            roll_number: h.roll_number.clone(),
            school_name: h.school_name.clone(),
            academic_year: h.academic_year.clone(),
            principal_comment: h.principal_comment.clone(),
            periods: Some(self.periods.periods().to_vec()),
            grades: self.subjects.iter().map(|s| s.to_flat_entry()).collect(),
        }
    }

    /// Builds a card from a document. Without an explicit registry the
    /// periods are derived once from the first grade entry's keys.
    pub fn from_document(doc: &ReportCardDocument, owner_id: &str) -> Self {
        let subjects: Vec<SubjectRecord> = doc
            .grades
            .iter()
            .map(SubjectRecord::from_flat_entry)
            .collect();
        let periods = match &doc.periods {
            Some(list) if !list.is_empty() => PeriodRegistry::from_periods(list.clone()),
            _ => derive_periods(&subjects),
        };
        ReportCard {
            header: ReportCardHeader {
                id: Uuid::new_v4().to_string(),
                owner_id: owner_id.to_string(),
                student_id: doc.id.trim().to_string(),
                name: doc.name.trim().to_string(),
                class_name: doc.class_name.trim().to_string(),
                roll_number: doc.roll_number.trim().to_string(),
                school_name: doc.school_name.trim().to_string(),
                academic_year: doc.academic_year.trim().to_string(),
                principal_comment: doc.principal_comment.clone(),
                updated_at: None,
            },
            periods,
            subjects,
        }
    }
}

pub fn derive_periods(subjects: &[SubjectRecord]) -> PeriodRegistry {
    let empty = Map::new();
    let first = subjects.first().map(|s| &s.scores).unwrap_or(&empty);
    periods::derive_from_scores(first)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

const HEADER_COLUMNS: &str = "id, owner_id, student_id, name, class_name, roll_number,
    school_name, academic_year, principal_comment, updated_at";

fn header_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReportCardHeader> {
    Ok(ReportCardHeader {
        id: r.get(0)?,
        owner_id: r.get(1)?,
        student_id: r.get(2)?,
        name: r.get(3)?,
        class_name: r.get(4)?,
        roll_number: r.get(5)?,
        school_name: r.get(6)?,
        academic_year: r.get(7)?,
        principal_comment: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

// Write helpers run on whatever connection or transaction they are handed.
// IPC handlers wrap each mutation together with its audit row.
pub fn insert_report_card(conn: &Connection, card: &ReportCard) -> anyhow::Result<()> {
    let h = &card.header;
    let periods_json = serde_json::to_string(&card.periods)?;
    conn.execute(
        "INSERT INTO report_cards(id, owner_id, student_id, name, class_name, roll_number,
            school_name, academic_year, principal_comment, updated_at, periods_json)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &h.id,
            &h.owner_id,
            &h.student_id,
            &h.name,
            &h.class_name,
            &h.roll_number,
            &h.school_name,
            &h.academic_year,
            &h.principal_comment,
            now_rfc3339(),
            periods_json,
        ),
    )
    .context("failed to insert report card")?;
    write_subjects(conn, &h.id, &card.subjects)?;
    Ok(())
}

pub fn get_header(conn: &Connection, id: &str) -> anyhow::Result<Option<ReportCardHeader>> {
    let sql = format!("SELECT {} FROM report_cards WHERE id = ?", HEADER_COLUMNS);
    Ok(conn.query_row(&sql, [id], header_from_row).optional()?)
}

/// Lists headers, optionally restricted to one owner.
pub fn list_headers(conn: &Connection, owner_id: Option<&str>) -> anyhow::Result<Vec<ReportCardHeader>> {
    let mut out = Vec::new();
    match owner_id {
        Some(owner) => {
            let sql = format!(
                "SELECT {} FROM report_cards WHERE owner_id = ? ORDER BY class_name, roll_number, name",
                HEADER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map([owner], header_from_row)? {
                out.push(row?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {} FROM report_cards ORDER BY class_name, roll_number, name",
                HEADER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            for row in stmt.query_map([], header_from_row)? {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

pub fn find_by_student(
    conn: &Connection,
    student_id: &str,
    roll_number: &str,
) -> anyhow::Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM report_cards WHERE student_id = ? AND roll_number = ?
             ORDER BY updated_at DESC LIMIT 1",
            (student_id, roll_number),
            |r| r.get(0),
        )
        .optional()?)
}

pub fn load_subjects(conn: &Connection, report_card_id: &str) -> anyhow::Result<Vec<SubjectRecord>> {
    let mut stmt = conn.prepare(
        "SELECT subject, comment, scores_json
         FROM report_card_grades
         WHERE report_card_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([report_card_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (subject, comment, scores_json) in rows {
        // A corrupt score blob degrades to an empty row rather than failing the card.
        let scores = match serde_json::from_str::<Value>(&scores_json) {
            Ok(Value::Object(m)) => m,
            _ => {
                tracing::warn!(report_card_id, subject = %subject, "unreadable scores_json, treating as empty");
                Map::new()
            }
        };
        out.push(SubjectRecord {
            subject,
            comment,
            scores,
        });
    }
    Ok(out)
}

/// Loads a full card. A missing stored registry is derived from the first
/// subject's score keys and written back, once.
pub fn load_report_card(conn: &Connection, id: &str) -> anyhow::Result<Option<ReportCard>> {
    let Some(header) = get_header(conn, id)? else {
        return Ok(None);
    };
    let subjects = load_subjects(conn, id)?;
    let periods_json: Option<String> = conn.query_row(
        "SELECT periods_json FROM report_cards WHERE id = ?",
        [id],
        |r| r.get(0),
    )?;

    let stored = periods_json
        .as_deref()
        .and_then(|s| serde_json::from_str::<PeriodRegistry>(s).ok())
        .filter(|reg| !reg.is_empty());
    let periods = match stored {
        Some(reg) => reg,
        None => {
            let derived = derive_periods(&subjects);
            tracing::info!(
                report_card_id = id,
                periods = derived.len(),
                "derived period registry from stored grade keys"
            );
            save_periods(conn, id, &derived)?;
            derived
        }
    };

    Ok(Some(ReportCard {
        header,
        periods,
        subjects,
    }))
}

pub fn save_periods(conn: &Connection, id: &str, periods: &PeriodRegistry) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE report_cards SET periods_json = ?, updated_at = ? WHERE id = ?",
        (serde_json::to_string(periods)?, now_rfc3339(), id),
    )
    .context("failed to store period registry")?;
    Ok(())
}

/// Replaces every grade row of a card.
pub fn save_subjects(conn: &Connection, id: &str, subjects: &[SubjectRecord]) -> anyhow::Result<()> {
    conn.execute("DELETE FROM report_card_grades WHERE report_card_id = ?", [id])?;
    write_subjects(conn, id, subjects)?;
    conn.execute(
        "UPDATE report_cards SET updated_at = ? WHERE id = ?",
        (now_rfc3339(), id),
    )?;
    Ok(())
}

fn write_subjects(conn: &Connection, id: &str, subjects: &[SubjectRecord]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO report_card_grades(id, report_card_id, sort_order, subject, comment, scores_json)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (i, s) in subjects.iter().enumerate() {
        stmt.execute((
            Uuid::new_v4().to_string(),
            id,
            i as i64,
            &s.subject,
            &s.comment,
            serde_json::to_string(&s.scores)?,
        ))
        .context("failed to insert grade row")?;
    }
    Ok(())
}

pub fn update_header(conn: &Connection, h: &ReportCardHeader) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE report_cards SET student_id = ?, name = ?, class_name = ?, roll_number = ?,
            school_name = ?, academic_year = ?, principal_comment = ?, updated_at = ?
         WHERE id = ?",
        (
            &h.student_id,
            &h.name,
            &h.class_name,
            &h.roll_number,
            &h.school_name,
            &h.academic_year,
            &h.principal_comment,
            now_rfc3339(),
            &h.id,
        ),
    )
    .context("failed to update report card")?;
    Ok(())
}

pub fn delete_report_card(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    conn.execute("DELETE FROM report_card_grades WHERE report_card_id = ?", [id])?;
    let n = conn.execute("DELETE FROM report_cards WHERE id = ?", [id])?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_conn() -> Connection {
        let dir = std::env::temp_dir().join(format!("reportcardd-cards-{}", Uuid::new_v4()));
        crate::db::open_db(&dir).expect("open db")
    }

    #[test]
    fn document_without_periods_derives_registry() {
        let doc: ReportCardDocument = serde_json::from_value(json!({
            "id": "S-100",
            "name": "Ada Lovelace",
            "className": "10A",
            "rollNumber": 7,
            "grades": [
                { "_id": "x1", "subject": "Math", "p1": 90, "p2": "85", "exam1": 80 },
                { "subject": "Art", "comment": "Lovely", "p1": 70 }
            ]
        }))
        .expect("document");
        assert_eq!(doc.roll_number, "7");

        let card = ReportCard::from_document(&doc, "staff-1");
        let ids: Vec<&str> = card.periods.periods().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "exam1"]);
        assert_eq!(card.subjects[1].comment, "Lovely");

        let back = card.to_document();
        assert_eq!(back.id, "S-100");
        assert_eq!(back.periods.as_ref().map(|p| p.len()), Some(3));
        assert_eq!(back.grades[0].get("p2"), Some(&json!("85")));
    }

    #[test]
    fn null_registry_is_migrated_on_load() {
        let conn = temp_conn();
        let doc: ReportCardDocument = serde_json::from_value(json!({
            "id": "S-1",
            "name": "Grace Hopper",
            "grades": [{ "subject": "Science", "p1": 88, "exam1": 92 }]
        }))
        .expect("document");
        let card = ReportCard::from_document(&doc, "owner");
        insert_report_card(&conn, &card).expect("insert");
        conn.execute(
            "UPDATE report_cards SET periods_json = NULL WHERE id = ?",
            [&card.header.id],
        )
        .expect("clear registry");

        let loaded = load_report_card(&conn, &card.header.id)
            .expect("load")
            .expect("card exists");
        assert_eq!(loaded.periods.len(), 2);

        let stored: Option<String> = conn
            .query_row(
                "SELECT periods_json FROM report_cards WHERE id = ?",
                [&card.header.id],
                |r| r.get(0),
            )
            .expect("query");
        assert!(stored.is_some());
    }
}
