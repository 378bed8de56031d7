use crate::cards::{self, ReportCard, ReportCardDocument, ReportCardHeader};
use crate::grades::SubjectRecord;
use crate::ipc::helpers::{
    card_from_params, db_conn, in_transaction, optional_str, required_str, respond, storage_err, Access, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::periods::PeriodRegistry;
use serde_json::json;
use uuid::Uuid;

const HEADER_TEXT_MAX: usize = 200;
const PRINCIPAL_COMMENT_MAX: usize = 2000;

fn text_param(req: &Request, key: &str, max_len: usize) -> Result<Option<String>, HandlerErr> {
    let Some(s) = optional_str(req, key)? else {
        return Ok(None);
    };
    if s.chars().count() > max_len {
        return Err(HandlerErr::bad_params(format!("{} length must be <= {}", key, max_len)));
    }
    Ok(Some(s))
}

fn subject_names(req: &Request) -> Result<Vec<String>, HandlerErr> {
    let Some(raw) = req.params.get("subjects") else {
        return Ok(Vec::new());
    };
    let Some(arr) = raw.as_array() else {
        return Err(HandlerErr::bad_params("subjects must be an array of strings"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(HandlerErr::bad_params("subjects must be non-empty strings"));
        };
        out.push(s.to_string());
    }
    Ok(out)
}

fn list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let access = Access::resolve(conn, req)?;
    let headers = cards::list_headers(conn, access.owner_filter())
        .map_err(storage_err("db_query_failed"))?;
    Ok(json!({ "reportCards": headers }))
}

fn create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let access = Access::resolve(conn, req)?;

    let name = required_str(req, "name")?;
    let student_id = required_str(req, "studentId")?;
    let text = |key: &str| -> Result<String, HandlerErr> {
        Ok(text_param(req, key, HEADER_TEXT_MAX)?.unwrap_or_default().trim().to_string())
    };
    let header = ReportCardHeader {
        id: Uuid::new_v4().to_string(),
        owner_id: access.actor.clone(),
        student_id,
        name,
        class_name: text("className")?,
        roll_number: text("rollNumber")?,
        school_name: text("schoolName")?,
        academic_year: text("academicYear")?,
        principal_comment: text_param(req, "principalComment", PRINCIPAL_COMMENT_MAX)?
            .unwrap_or_default(),
        updated_at: None,
    };
    let subjects = subject_names(req)?
        .into_iter()
        .map(SubjectRecord::new)
        .collect();
    let card = ReportCard {
        header,
        periods: PeriodRegistry::defaults(),
        subjects,
    };
    in_transaction(conn, |tx| {
        cards::insert_report_card(tx, &card).map_err(storage_err("db_insert_failed"))?;
        access.audit(tx, "reportCards.create", Some(&card.header.id), None)
    })?;

    Ok(json!({
        "reportCardId": card.header.id,
        "periods": card.periods,
    }))
}

fn get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, card) = card_from_params(state, req)?;
    Ok(json!({
        "reportCard": card.header,
        "periods": card.periods,
        "subjects": card.subjects,
    }))
}

fn update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (access, card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let mut h = card.header;

    let fields: [(&str, &mut String, usize); 7] = [
        ("studentId", &mut h.student_id, HEADER_TEXT_MAX),
        ("name", &mut h.name, HEADER_TEXT_MAX),
        ("className", &mut h.class_name, HEADER_TEXT_MAX),
        ("rollNumber", &mut h.roll_number, HEADER_TEXT_MAX),
        ("schoolName", &mut h.school_name, HEADER_TEXT_MAX),
        ("academicYear", &mut h.academic_year, HEADER_TEXT_MAX),
        ("principalComment", &mut h.principal_comment, PRINCIPAL_COMMENT_MAX),
    ];
    let mut changed: Vec<&str> = Vec::new();
    for (key, slot, max_len) in fields {
        if let Some(v) = text_param(req, key, max_len)? {
            *slot = if key == "principalComment" {
                v
            } else {
                v.trim().to_string()
            };
            changed.push(key);
        }
    }
    if h.name.is_empty() || h.student_id.is_empty() {
        return Err(HandlerErr::bad_params("name and studentId must not be empty"));
    }

    in_transaction(conn, |tx| {
        cards::update_header(tx, &h).map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "reportCards.update",
            Some(&h.id),
            Some(json!({ "fields": changed })),
        )
    })?;
    Ok(json!({ "reportCardId": h.id, "updated": changed }))
}

fn delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (access, card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let deleted = in_transaction(conn, |tx| {
        let deleted = cards::delete_report_card(tx, &card.header.id)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(tx, "reportCards.delete", Some(&card.header.id), None)?;
        Ok(deleted)
    })?;
    Ok(json!({ "deleted": deleted }))
}

fn import_document(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let access = Access::resolve(conn, req)?;

    let Some(raw) = req.params.get("document").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("document must be an object"));
    };
    let doc: ReportCardDocument = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid document: {}", e)))?;
    if doc.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("document.name must not be empty"));
    }

    let derived = doc.periods.as_ref().map(|p| p.is_empty()).unwrap_or(true);
    let card = ReportCard::from_document(&doc, &access.actor);
    in_transaction(conn, |tx| {
        cards::insert_report_card(tx, &card).map_err(storage_err("db_insert_failed"))?;
        access.audit(
            tx,
            "reportCards.importDocument",
            Some(&card.header.id),
            Some(json!({ "derivedPeriods": derived, "subjects": card.subjects.len() })),
        )
    })?;

    Ok(json!({
        "reportCardId": card.header.id,
        "derivedPeriods": derived,
        "periods": card.periods,
    }))
}

fn export_document(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, card) = card_from_params(state, req)?;
    Ok(json!({ "document": card.to_document() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reportCards.list" => list(state, req),
        "reportCards.create" => create(state, req),
        "reportCards.get" => get(state, req),
        "reportCards.update" => update(state, req),
        "reportCards.delete" => delete(state, req),
        "reportCards.importDocument" => import_document(state, req),
        "reportCards.exportDocument" => export_document(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
