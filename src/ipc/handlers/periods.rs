use crate::cards;
use crate::ipc::helpers::{
    card_from_params, db_conn, in_transaction, optional_str, required_str, respond, storage_err, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::periods::{PeriodKind, RegistryError};
use serde_json::json;

const PERIOD_NAME_MAX: usize = 60;

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, card) = card_from_params(state, req)?;
    Ok(json!({ "periods": card.periods }))
}

fn semesters(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, card) = card_from_params(state, req)?;
    Ok(json!({ "semesters": card.periods.semesters() }))
}

fn add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let kind_raw = required_str(req, "kind")?;
    let kind = match PeriodKind::parse(&kind_raw) {
        Some(k @ (PeriodKind::Period | PeriodKind::Exam)) => k,
        _ => {
            return Err(HandlerErr::bad_params("kind must be one of: period, exam")
                .with_details(json!({ "kind": kind_raw })))
        }
    };
    let name = optional_str(req, "name")?;
    if let Some(n) = name.as_deref() {
        if n.chars().count() > PERIOD_NAME_MAX {
            return Err(HandlerErr::bad_params(format!(
                "name length must be <= {}",
                PERIOD_NAME_MAX
            )));
        }
    }

    let (access, mut card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let period = card.periods.add_period(kind, name.as_deref());
    in_transaction(conn, |tx| {
        cards::save_periods(tx, &card.header.id, &card.periods)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "periods.add",
            Some(&card.header.id),
            Some(json!({ "periodId": period.id })),
        )
    })?;

    Ok(json!({ "period": period, "periods": card.periods }))
}

fn remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let period_id = required_str(req, "periodId")?;
    let (access, mut card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;

    match card.periods.remove_period(&period_id) {
        Ok(removed) => {
            // A later add may hand out the same id again; it must start empty.
            for s in &mut card.subjects {
                s.drop_score(&removed.id);
            }
            in_transaction(conn, |tx| {
                cards::save_periods(tx, &card.header.id, &card.periods)
                    .map_err(storage_err("db_update_failed"))?;
                cards::save_subjects(tx, &card.header.id, &card.subjects)
                    .map_err(storage_err("db_update_failed"))?;
                access.audit(
                    tx,
                    "periods.remove",
                    Some(&card.header.id),
                    Some(json!({ "periodId": removed.id })),
                )
            })?;
            Ok(json!({ "removed": true, "period": removed, "periods": card.periods }))
        }
        // Rejected, not failed: the registry is left exactly as it was.
        Err(e @ RegistryError::LastPeriod) => {
            tracing::info!(report_card_id = %card.header.id, period_id = %period_id, "{}", e);
            Ok(json!({
                "removed": false,
                "code": e.code(),
                "warning": e.to_string(),
                "periods": card.periods
            }))
        }
        Err(e @ RegistryError::NotFound(_)) => Err(HandlerErr::new(e.code(), e.to_string())
            .with_details(json!({ "periodId": period_id }))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "periods.list" => list(state, req),
        "periods.semesters" => semesters(state, req),
        "periods.add" => add(state, req),
        "periods.remove" => remove(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
