use crate::audit;
use crate::ipc::helpers::{db_conn, respond, storage_err, Access, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const AUDIT_LIST_DEFAULT: i64 = 100;
const AUDIT_LIST_MAX: i64 = 1000;

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let limit = match req.params.get("limit") {
        None => AUDIT_LIST_DEFAULT,
        Some(v) if v.is_null() => AUDIT_LIST_DEFAULT,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=AUDIT_LIST_MAX).contains(&n) => n,
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "limit must be integer in 1..={}",
                    AUDIT_LIST_MAX
                )))
            }
        },
    };
    let conn = db_conn(state)?;
    let access = Access::resolve(conn, req)?;
    access.require_super_admin()?;
    let events = audit::list(conn, limit).map_err(storage_err("db_query_failed"))?;
    Ok(json!({ "events": events }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "audit.list" => list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
