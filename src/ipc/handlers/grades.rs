use crate::cards;
use crate::config::GradingSettings;
use crate::grades::{GradeMatrix, MissingScore, SubjectRecord};
use crate::ipc::helpers::{
    card_from_params, db_conn, in_transaction, required_str, respond, storage_err, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

const SUBMIT_MAX_SUBJECTS: usize = 100;
const SUBJECT_NAME_MAX: usize = 80;
const COMMENT_MAX: usize = 1000;

fn subject_index(subjects: &[SubjectRecord], req: &Request) -> Result<usize, HandlerErr> {
    let name = required_str(req, "subject")?;
    subjects
        .iter()
        .position(|s| s.subject.eq_ignore_ascii_case(&name))
        .ok_or_else(|| {
            HandlerErr::new("not_found", "subject not found").with_details(json!({ "subject": name }))
        })
}

fn add_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let name = required_str(req, "subject")?;
    if name.chars().count() > SUBJECT_NAME_MAX {
        return Err(HandlerErr::bad_params(format!(
            "subject length must be <= {}",
            SUBJECT_NAME_MAX
        )));
    }
    let (access, mut card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    if card.subjects.iter().any(|s| s.subject.eq_ignore_ascii_case(&name)) {
        return Err(HandlerErr::new("conflict", "subject already exists")
            .with_details(json!({ "subject": name })));
    }
    card.subjects.push(SubjectRecord::new(name.clone()));
    in_transaction(conn, |tx| {
        cards::save_subjects(tx, &card.header.id, &card.subjects)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "grades.addSubject",
            Some(&card.header.id),
            Some(json!({ "subject": name })),
        )
    })?;
    Ok(json!({ "subjectCount": card.subjects.len() }))
}

fn remove_subject(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let (access, mut card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let idx = subject_index(&card.subjects, req)?;
    let removed = card.subjects.remove(idx);
    in_transaction(conn, |tx| {
        cards::save_subjects(tx, &card.header.id, &card.subjects)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "grades.removeSubject",
            Some(&card.header.id),
            Some(json!({ "subject": removed.subject })),
        )
    })?;
    Ok(json!({ "subjectCount": card.subjects.len() }))
}

fn set_comment(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let comment = match req.params.get("comment") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) if s.chars().count() <= COMMENT_MAX => s.clone(),
        Some(Value::String(_)) => {
            return Err(HandlerErr::bad_params(format!(
                "comment length must be <= {}",
                COMMENT_MAX
            )))
        }
        Some(_) => return Err(HandlerErr::bad_params("comment must be string or null")),
    };
    let (access, mut card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let idx = subject_index(&card.subjects, req)?;
    card.subjects[idx].comment = comment;
    in_transaction(conn, |tx| {
        cards::save_subjects(tx, &card.header.id, &card.subjects)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "grades.setComment",
            Some(&card.header.id),
            Some(json!({ "subject": card.subjects[idx].subject })),
        )
    })?;
    Ok(json!({ "subject": card.subjects[idx].subject }))
}

fn parse_submission(req: &Request) -> Result<Vec<SubjectRecord>, HandlerErr> {
    let Some(arr) = req.params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("subjects must be an array"));
    };
    if arr.len() > SUBMIT_MAX_SUBJECTS {
        return Err(HandlerErr::bad_params("too many subjects in one submission")
            .with_details(json!({ "count": arr.len(), "max": SUBMIT_MAX_SUBJECTS })));
    }

    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return Err(HandlerErr::bad_params("each subject must be an object")
                .with_details(json!({ "index": i })));
        };
        let subject = obj
            .get("subject")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params("subject name is required").with_details(json!({ "index": i }))
            })?;
        if out
            .iter()
            .any(|s: &SubjectRecord| s.subject.eq_ignore_ascii_case(subject))
        {
            return Err(HandlerErr::new("conflict", "duplicate subject in submission")
                .with_details(json!({ "index": i, "subject": subject })));
        }
        let comment = obj
            .get("comment")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let scores: Map<String, Value> = match obj.get("scores") {
            Some(Value::Object(m)) => m.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return Err(HandlerErr::bad_params("scores must be an object")
                    .with_details(json!({ "index": i })))
            }
        };
        out.push(SubjectRecord {
            subject: subject.to_string(),
            comment,
            scores,
        });
    }
    Ok(out)
}

/// Replaces every subject row. Scores are read for the card's active periods;
/// anything blank or malformed is stored as the submission default.
fn submit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let submitted = parse_submission(req)?;
    let (access, card) = card_from_params(state, req)?;
    let conn = db_conn(state)?;
    let settings = GradingSettings::load(conn).map_err(storage_err("db_query_failed"))?;

    let matrix = GradeMatrix::collect(
        &submitted,
        &card.periods,
        MissingScore::Default(settings.submission_default),
    );
    let records = matrix.to_records(&card.periods);
    in_transaction(conn, |tx| {
        cards::save_subjects(tx, &card.header.id, &records)
            .map_err(storage_err("db_update_failed"))?;
        access.audit(
            tx,
            "grades.submit",
            Some(&card.header.id),
            Some(json!({ "subjects": records.len() })),
        )
    })?;

    Ok(json!({ "subjects": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.addSubject" => add_subject(state, req),
        "grades.removeSubject" => remove_subject(state, req),
        "grades.setComment" => set_comment(state, req),
        "grades.submit" => submit(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
