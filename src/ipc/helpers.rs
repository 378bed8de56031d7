use crate::audit;
use crate::cards::{self, ReportCard};
use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub const ANONYMOUS_ACTOR: &str = "anonymous";

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Maps a storage failure onto an IPC error code.
pub fn storage_err(code: &'static str) -> impl Fn(anyhow::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, format!("{e:#}"))
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(id = %req.id, method = %req.method, code = e.code, "{}", e.message);
            e.response(&req.id)
        }
    }
}

/// Runs `f` inside one transaction; any error rolls the whole thing back.
pub fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, HandlerErr>,
) -> Result<T, HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let out = f(&tx)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(out)
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(HandlerErr::bad_params(format!("missing {}", key))),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key))),
    }
}

/// Who is calling, and whether they may see every report card.
pub struct Access {
    pub actor: String,
    pub super_admin: bool,
}

impl Access {
    pub fn resolve(conn: &Connection, req: &Request) -> Result<Self, HandlerErr> {
        let actor = req
            .actor
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS_ACTOR)
            .to_string();
        let super_admin = config::super_admins(conn)
            .map_err(storage_err("db_query_failed"))?
            .iter()
            .any(|a| *a == actor);
        Ok(Self { actor, super_admin })
    }

    pub fn require_super_admin(&self) -> Result<(), HandlerErr> {
        if self.super_admin {
            Ok(())
        } else {
            Err(HandlerErr::new("forbidden", "super-admin access required")
                .with_details(json!({ "actor": self.actor })))
        }
    }

    pub fn owner_filter(&self) -> Option<&str> {
        if self.super_admin {
            None
        } else {
            Some(self.actor.as_str())
        }
    }

    pub fn audit(
        &self,
        conn: &Connection,
        action: &str,
        report_card_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<(), HandlerErr> {
        audit::record(conn, &self.actor, action, report_card_id, details.as_ref())
            .map_err(storage_err("db_insert_failed"))
    }
}

/// Loads a card the caller owns (or any card, for super-admins).
pub fn load_card(conn: &Connection, access: &Access, id: &str) -> Result<ReportCard, HandlerErr> {
    let card = cards::load_report_card(conn, id)
        .map_err(storage_err("db_query_failed"))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "report card not found")
                .with_details(json!({ "reportCardId": id }))
        })?;
    if !access.super_admin && card.header.owner_id != access.actor {
        return Err(HandlerErr::new("forbidden", "report card belongs to another user")
            .with_details(json!({ "reportCardId": id })));
    }
    Ok(card)
}

pub fn card_from_params(state: &AppState, req: &Request) -> Result<(Access, ReportCard), HandlerErr> {
    let conn = db_conn(state)?;
    let access = Access::resolve(conn, req)?;
    let id = required_str(req, "reportCardId")?;
    let card = load_card(conn, &access, &id)?;
    Ok((access, card))
}
