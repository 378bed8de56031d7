use crate::config::{self, SetupSection};
use crate::db;
use crate::format::DisplayMode;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{in_transaction, storage_err, Access};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

const MAX_SUPER_ADMINS: usize = 50;

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_score_default(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=100.0).contains(&n) {
        return Err(format!("{} must be in 0..=100", key));
    }
    Ok(n)
}

fn parse_actor_list(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.len() > MAX_SUPER_ADMINS {
        return Err(format!("{} must have at most {} entries", key, MAX_SUPER_ADMINS));
    }
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = item
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("{} entries must be non-empty strings", key))?;
        if !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "placeholderDefault" | "submissionDefault" => {
                    obj.insert(k.clone(), Value::from(parse_score_default(v, k)?));
                }
                "displayMode" => {
                    let mode = v
                        .as_str()
                        .and_then(DisplayMode::parse)
                        .ok_or_else(|| "displayMode must be one of: numeric, letter".to_string())?;
                    obj.insert(k.clone(), Value::String(mode.as_str().to_string()));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Views => match k.as_str() {
                "adminPrecision" | "reportCardPrecision" | "dashboardPrecision" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 4)?));
                }
                _ => return Err(format!("unknown views field: {}", k)),
            },
            SetupSection::Security => match k.as_str() {
                "superAdmins" => {
                    obj.insert(k.clone(), json!(parse_actor_list(v, k)?));
                }
                _ => return Err(format!("unknown security field: {}", k)),
            },
        }
    }
    Ok(())
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grading = match config::load_section(conn, SetupSection::Grading) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let views = match config::load_section(conn, SetupSection::Views) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let security = match config::load_section(conn, SetupSection::Security) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "grading": grading,
            "views": views,
            "security": security
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let access = match Access::resolve(conn, req) {
        Ok(a) => a,
        Err(e) => return e.response(&req.id),
    };
    // Until someone is named super-admin, any caller may configure the workspace.
    let bootstrap = match config::super_admins(conn) {
        Ok(list) => list.is_empty(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !bootstrap {
        if let Err(e) = access.require_super_admin() {
            return e.response(&req.id);
        }
    }

    let mut current = match config::load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    let saved = in_transaction(conn, |tx| {
        db::settings_set_json(tx, section.key(), &current)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "setup.update",
            None,
            Some(json!({ "section": section_raw, "fields": patch_obj.keys().collect::<Vec<_>>() })),
        )
    });
    if let Err(e) = saved {
        return e.response(&req.id);
    }
    ok(&req.id, json!({ "section": section_raw, "value": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
