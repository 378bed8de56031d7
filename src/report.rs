use crate::calc::{self, EmptySemester};
use crate::cards::{ReportCard, ReportCardHeader};
use crate::config::GradingSettings;
use crate::format::{
    self, format_score, highlight_extremes, is_failing, letter_grade, DisplayMode, LetterGrade,
    ATTENTION_THRESHOLD,
};
use crate::grades::{GradeMatrix, MissingScore};
use crate::periods::PeriodKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportView {
    /// Grade entry table; blanks show the placeholder default.
    Admin,
    /// Student/parent report card; blanks are skipped and show `-`.
    ReportCard,
    /// Compact overview with the "needs attention" highlight.
    Dashboard,
}

impl ReportView {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "reportCard" => Some(Self::ReportCard),
            "dashboard" => Some(Self::Dashboard),
            _ => None,
        }
    }
}

/// Everything that differs between views, resolved once per render.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewProfile {
    pub view: ReportView,
    pub mode: DisplayMode,
    pub precision: usize,
    pub missing: MissingScore,
    pub empty_semester: EmptySemester,
    pub attention_threshold: Option<f64>,
}

impl ViewProfile {
    pub fn for_view(view: ReportView, settings: &GradingSettings, mode: Option<DisplayMode>) -> Self {
        let mode = mode.unwrap_or(settings.display_mode);
        match view {
            ReportView::Admin => Self {
                view,
                mode,
                precision: settings.admin_precision,
                missing: MissingScore::Default(settings.placeholder_default),
                empty_semester: EmptySemester::Zero,
                attention_threshold: None,
            },
            ReportView::ReportCard => Self {
                view,
                mode,
                precision: settings.report_card_precision,
                missing: MissingScore::Absent,
                empty_semester: EmptySemester::Absent,
                attention_threshold: None,
            },
            ReportView::Dashboard => Self {
                view,
                mode,
                precision: settings.dashboard_precision,
                missing: MissingScore::Absent,
                empty_semester: EmptySemester::Absent,
                attention_threshold: Some(ATTENTION_THRESHOLD),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    Period,
    Exam,
    Semester,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub label: String,
    pub kind: ColumnKind,
    pub semester_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Highlight {
    Highest,
    Lowest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub key: String,
    pub value: Option<f64>,
    pub display: String,
    pub letter: Option<LetterGrade>,
    pub failing: bool,
    pub needs_attention: bool,
    pub highlight: Option<Highlight>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyRow {
    pub subject: String,
    pub comment: String,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardModel {
    pub report_card: ReportCardHeader,
    pub view: ReportView,
    pub mode: DisplayMode,
    pub precision: usize,
    pub header: Vec<Column>,
    pub rows: Vec<BodyRow>,
    pub footer: Vec<Cell>,
}

/// Grades and flags come from the exact score; only `value` and `display`
/// are rounded to the view's precision.
fn make_cell(key: &str, score: Option<f64>, profile: &ViewProfile, highlight: Option<Highlight>) -> Cell {
    Cell {
        key: key.to_string(),
        value: score.map(|v| format::round_off(v, profile.precision)),
        display: format_score(score, profile.mode, profile.precision),
        letter: score.map(letter_grade),
        failing: score.map(is_failing).unwrap_or(false),
        needs_attention: match (score, profile.attention_threshold) {
            (Some(v), Some(t)) => v < t,
            _ => false,
        },
        highlight,
    }
}

/// Column layout: each semester's periods, then its average, then the final.
pub fn build_columns(card: &ReportCard) -> Vec<Column> {
    let semesters = card.periods.semesters();
    let labels = card.periods.semester_labels();
    let mut cols = Vec::new();
    for (i, group) in semesters.iter().enumerate() {
        for p in group {
            cols.push(Column {
                key: p.id.clone(),
                label: p.name.clone(),
                kind: if p.kind == PeriodKind::Exam {
                    ColumnKind::Exam
                } else {
                    ColumnKind::Period
                },
                semester_index: Some(i),
            });
        }
        let (key, label) = match labels.get(i) {
            Some(p) => (p.id.clone(), p.name.clone()),
            None => (format!("sem{}", i + 1), format!("Semester {} Average", i + 1)),
        };
        cols.push(Column {
            key,
            label,
            kind: ColumnKind::Semester,
            semester_index: Some(i),
        });
    }
    cols.push(Column {
        key: "final".to_string(),
        label: "Final Average".to_string(),
        kind: ColumnKind::Final,
        semester_index: None,
    });
    cols
}

/// Registry + grades -> averages -> presentation payload.
pub fn build_report_card_model(card: &ReportCard, profile: &ViewProfile) -> ReportCardModel {
    let matrix = GradeMatrix::collect(&card.subjects, &card.periods, profile.missing);
    let averages = calc::compute_averages(&card.periods, &matrix, profile.empty_semester);
    let header = build_columns(card);

    let rows = matrix
        .rows
        .iter()
        .zip(&averages.per_subject)
        .map(|(row, avg)| {
            let period_scores: Vec<(&str, Option<f64>)> = averages
                .semesters
                .iter()
                .flatten()
                .map(|p| (p.id.as_str(), row.score(&p.id)))
                .collect();
            let extremes = highlight_extremes(&period_scores);

            let cells = header
                .iter()
                .map(|col| match col.kind {
                    ColumnKind::Period | ColumnKind::Exam => {
                        let highlight = if extremes.max.as_deref() == Some(col.key.as_str()) {
                            Some(Highlight::Highest)
                        } else if extremes.min.as_deref() == Some(col.key.as_str()) {
                            Some(Highlight::Lowest)
                        } else {
                            None
                        };
                        make_cell(&col.key, row.score(&col.key), profile, highlight)
                    }
                    ColumnKind::Semester => {
                        let v = col
                            .semester_index
                            .and_then(|i| avg.semester_averages.get(i).copied().flatten());
                        make_cell(&col.key, v, profile, None)
                    }
                    ColumnKind::Final => {
                        let v = match (avg.final_average, profile.empty_semester) {
                            (None, EmptySemester::Zero) => Some(0.0),
                            (v, _) => v,
                        };
                        make_cell(&col.key, v, profile, None)
                    }
                })
                .collect();

            BodyRow {
                subject: row.subject.clone(),
                comment: row.comment.clone(),
                cells,
            }
        })
        .collect();

    let footer = header
        .iter()
        .map(|col| {
            let v = match col.kind {
                ColumnKind::Period | ColumnKind::Exam => Some(calc::period_average(&matrix, &col.key)),
                ColumnKind::Semester => col
                    .semester_index
                    .and_then(|i| averages.per_semester.get(i).copied()),
                ColumnKind::Final => Some(averages.final_class_average),
            };
            make_cell(&col.key, v, profile, None)
        })
        .collect();

    ReportCardModel {
        report_card: card.header.clone(),
        view: profile.view,
        mode: profile.mode,
        precision: profile.precision,
        header,
        rows,
        footer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::SubjectRecord;
    use crate::periods::{Period, PeriodRegistry};
    use serde_json::json;

    fn card(periods: &[(&str, PeriodKind)], grades: serde_json::Value) -> ReportCard {
        ReportCard {
            header: ReportCardHeader::default(),
            periods: PeriodRegistry::from_periods(
                periods
                    .iter()
                    .map(|(id, k)| Period::new(*id, id.to_uppercase(), *k))
                    .collect(),
            ),
            subjects: grades
                .as_array()
                .expect("array")
                .iter()
                .map(|g| SubjectRecord::from_flat_entry(g.as_object().expect("object")))
                .collect(),
        }
    }

    fn profile(view: ReportView) -> ViewProfile {
        ViewProfile::for_view(view, &GradingSettings::default(), None)
    }

    fn cell<'a>(row: &'a BodyRow, key: &str) -> &'a Cell {
        row.cells.iter().find(|c| c.key == key).expect("cell")
    }

    #[test]
    fn columns_follow_semester_groups() {
        let c = card(
            &[
                ("p1", PeriodKind::Period),
                ("exam1", PeriodKind::Exam),
                ("sem1", PeriodKind::Semester),
                ("p2", PeriodKind::Period),
            ],
            json!([]),
        );
        let keys: Vec<String> = build_columns(&c).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["p1", "exam1", "sem1", "p2", "sem2", "final"]);
    }

    #[test]
    fn report_card_view_shows_dash_for_empty_semester() {
        let c = card(
            &[
                ("p1", PeriodKind::Period),
                ("exam1", PeriodKind::Exam),
                ("p2", PeriodKind::Period),
                ("exam2", PeriodKind::Exam),
            ],
            json!([{ "subject": "Math", "p1": 90, "exam1": 70 }]),
        );
        let model = build_report_card_model(&c, &profile(ReportView::ReportCard));
        let row = &model.rows[0];
        assert_eq!(cell(row, "p2").display, "-");
        assert_eq!(cell(row, "sem1").display, "80.00");
        assert_eq!(cell(row, "sem2").display, "-");
        assert_eq!(cell(row, "final").display, "80.00");
        assert_eq!(cell(row, "p1").highlight, Some(Highlight::Highest));
        assert_eq!(cell(row, "exam1").highlight, Some(Highlight::Lowest));

        // Footer treats the blank p2 as 0 for the whole class.
        let p2 = model.footer.iter().find(|c| c.key == "p2").expect("footer p2");
        assert_eq!(p2.value, Some(0.0));
    }

    #[test]
    fn admin_view_fills_placeholders() {
        let c = card(
            &[("p1", PeriodKind::Period), ("p2", PeriodKind::Period)],
            json!([{ "subject": "Math", "p1": 70 }]),
        );
        let model = build_report_card_model(&c, &profile(ReportView::Admin));
        let row = &model.rows[0];
        assert_eq!(cell(row, "p2").value, Some(90.0));
        assert_eq!(cell(row, "sem1").display, "80.00");
    }

    #[test]
    fn dashboard_flags_attention_below_seventy() {
        let c = card(
            &[("p1", PeriodKind::Period), ("p2", PeriodKind::Period)],
            json!([{ "subject": "Math", "p1": 65, "p2": 55 }]),
        );
        let model = build_report_card_model(&c, &profile(ReportView::Dashboard));
        let row = &model.rows[0];
        let p1 = cell(row, "p1");
        assert!(p1.needs_attention);
        assert!(!p1.failing);
        assert_eq!(p1.display, "65.0");
        assert!(cell(row, "p2").failing);
        assert_eq!(cell(row, "final").display, "60.0");

        let rc = build_report_card_model(&c, &profile(ReportView::ReportCard));
        assert!(!cell(&rc.rows[0], "p1").needs_attention);
    }

    #[test]
    fn letters_and_flags_ignore_view_rounding() {
        let c = card(
            &[("p1", PeriodKind::Period), ("p2", PeriodKind::Period)],
            json!([{ "subject": "Math", "p1": 59.96, "p2": 59.96 }]),
        );
        for view in [ReportView::Admin, ReportView::ReportCard, ReportView::Dashboard] {
            let model = build_report_card_model(&c, &profile(view));
            let fin = cell(&model.rows[0], "final");
            assert_eq!(fin.letter, Some(LetterGrade::F), "{:?}", view);
            assert!(fin.failing, "{:?}", view);
        }

        let dash = build_report_card_model(&c, &profile(ReportView::Dashboard));
        let fin = cell(&dash.rows[0], "final");
        assert_eq!(fin.display, "60.0");
        assert_eq!(fin.value, Some(60.0));
        assert!(fin.needs_attention);

        let p = ViewProfile::for_view(
            ReportView::Dashboard,
            &GradingSettings::default(),
            Some(DisplayMode::Letter),
        );
        let letters = build_report_card_model(&c, &p);
        assert_eq!(cell(&letters.rows[0], "final").display, "F");
    }

    #[test]
    fn letter_mode_renders_letters() {
        let c = card(&[("p1", PeriodKind::Period)], json!([{ "subject": "Math", "p1": 91 }]));
        let p = ViewProfile::for_view(
            ReportView::ReportCard,
            &GradingSettings::default(),
            Some(DisplayMode::Letter),
        );
        let model = build_report_card_model(&c, &p);
        assert_eq!(cell(&model.rows[0], "p1").display, "A");
        assert_eq!(model.mode, DisplayMode::Letter);
    }
}
