use crate::calc;
use crate::cards::{self, ReportCard};
use crate::config::GradingSettings;
use crate::format::DisplayMode;
use crate::grades::GradeMatrix;
use crate::ipc::helpers::{card_from_params, db_conn, required_str, respond, storage_err, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{build_report_card_model, ReportView, ViewProfile};
use serde_json::json;

fn parse_view(req: &Request, default: ReportView) -> Result<ReportView, HandlerErr> {
    match req.params.get("view").and_then(|v| v.as_str()) {
        None => Ok(default),
        Some(s) => ReportView::parse(s).ok_or_else(|| {
            HandlerErr::bad_params("view must be one of: admin, reportCard, dashboard")
                .with_details(json!({ "view": s }))
        }),
    }
}

fn parse_mode(req: &Request) -> Result<Option<DisplayMode>, HandlerErr> {
    match req.params.get("mode") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(DisplayMode::parse)
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::bad_params("mode must be one of: numeric, letter")
                    .with_details(json!({ "mode": v }))
            }),
    }
}

fn profile_for(
    state: &AppState,
    view: ReportView,
    mode: Option<DisplayMode>,
) -> Result<ViewProfile, HandlerErr> {
    let conn = db_conn(state)?;
    let settings = GradingSettings::load(conn).map_err(storage_err("db_query_failed"))?;
    Ok(ViewProfile::for_view(view, &settings, mode))
}

fn render(card: &ReportCard, profile: &ViewProfile) -> serde_json::Value {
    json!({ "model": build_report_card_model(card, profile) })
}

fn report_card_model(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view = parse_view(req, ReportView::Admin)?;
    let mode = parse_mode(req)?;
    let (_, card) = card_from_params(state, req)?;
    let profile = profile_for(state, view, mode)?;
    Ok(render(&card, &profile))
}

/// Student/parent lookup. Authentication happens before the request reaches us.
fn student_view(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let roll_number = required_str(req, "rollNumber")?;
    let mode = parse_mode(req)?;
    let conn = db_conn(state)?;

    let id = cards::find_by_student(conn, &student_id, &roll_number)
        .map_err(storage_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "no report card for that student"))?;
    let card = cards::load_report_card(conn, &id)
        .map_err(storage_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", "report card not found"))?;

    let profile = profile_for(state, ReportView::ReportCard, mode)?;
    Ok(render(&card, &profile))
}

fn averages(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let view = parse_view(req, ReportView::Admin)?;
    let (_, card) = card_from_params(state, req)?;
    let profile = profile_for(state, view, None)?;
    let matrix = GradeMatrix::collect(&card.subjects, &card.periods, profile.missing);
    let averages = calc::compute_averages(&card.periods, &matrix, profile.empty_semester);
    Ok(json!({ "averages": averages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.reportCardModel" => report_card_model(state, req),
        "reports.studentView" => student_view(state, req),
        "calc.averages" => averages(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
