use crate::grades::{GradeMatrix, SubjectRow};
use crate::periods::{Period, PeriodRegistry};
use serde::Serialize;

/// How a semester with nothing to average is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptySemester {
    /// Admin views show 0.
    Zero,
    /// Student views show `-`.
    Absent,
}

/// Arithmetic mean that never divides by zero.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut n = 0_usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n > 0 {
        Some(sum / (n as f64))
    } else {
        None
    }
}

/// Whole-class mean: absent entries count as 0 but still count in the
/// denominator. An empty class averages to 0.
pub fn class_average<I>(values: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    mean(values.into_iter().map(|v| v.unwrap_or(0.0))).unwrap_or(0.0)
}

/// Mean of one period's score over every subject in the matrix.
pub fn period_average(matrix: &GradeMatrix, period_id: &str) -> f64 {
    class_average(matrix.rows.iter().map(|r| r.score(period_id)))
}

/// Mean of the subject's present scores across one semester group.
pub fn semester_average(row: &SubjectRow, semester: &[Period], empty: EmptySemester) -> Option<f64> {
    let avg = mean(semester.iter().filter_map(|p| row.score(&p.id)));
    match (avg, empty) {
        (Some(v), _) => Some(v),
        (None, EmptySemester::Zero) => Some(0.0),
        (None, EmptySemester::Absent) => None,
    }
}

/// Mean of the semesters that have a value. One semester with data is the
/// final average on its own.
pub fn final_average(semester_averages: &[Option<f64>]) -> Option<f64> {
    mean(semester_averages.iter().flatten().copied())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverages {
    pub subject: String,
    pub semester_averages: Vec<Option<f64>>,
    pub final_average: Option<f64>,
    pub scored_count: usize,
    pub absent_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodClassAverage {
    pub period_id: String,
    pub average: f64,
}

/// Every derived number for one report card. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedAverages {
    pub semesters: Vec<Vec<Period>>,
    pub per_subject: Vec<SubjectAverages>,
    pub per_period: Vec<PeriodClassAverage>,
    pub per_semester: Vec<f64>,
    pub final_class_average: f64,
}

pub fn compute_averages(
    periods: &PeriodRegistry,
    matrix: &GradeMatrix,
    empty: EmptySemester,
) -> ComputedAverages {
    let semesters = periods.semesters();
    let scored_ids: Vec<&str> = semesters
        .iter()
        .flat_map(|g| g.iter().map(|p| p.id.as_str()))
        .collect();

    let per_subject: Vec<SubjectAverages> = matrix
        .rows
        .iter()
        .map(|row| {
            let semester_averages: Vec<Option<f64>> = semesters
                .iter()
                .map(|g| semester_average(row, g, empty))
                .collect();
            let scored_count = scored_ids.iter().filter(|id| row.score(id).is_some()).count();
            SubjectAverages {
                subject: row.subject.clone(),
                final_average: final_average(&semester_averages),
                semester_averages,
                scored_count,
                absent_count: scored_ids.len() - scored_count,
            }
        })
        .collect();

    let per_period = scored_ids
        .iter()
        .map(|id| PeriodClassAverage {
            period_id: id.to_string(),
            average: period_average(matrix, id),
        })
        .collect();

    let per_semester = (0..semesters.len())
        .map(|i| class_average(per_subject.iter().map(|s| s.semester_averages[i])))
        .collect();

    let final_class_average = class_average(per_subject.iter().map(|s| s.final_average));

    ComputedAverages {
        semesters,
        per_subject,
        per_period,
        per_semester,
        final_class_average,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades::{MissingScore, SubjectRecord};
    use crate::periods::PeriodKind;
    use serde_json::json;

    fn records(v: serde_json::Value) -> Vec<SubjectRecord> {
        v.as_array()
            .expect("array")
            .iter()
            .map(|e| SubjectRecord::from_flat_entry(e.as_object().expect("object")))
            .collect()
    }

    fn two_semesters() -> PeriodRegistry {
        let mut reg = PeriodRegistry::new();
        for _ in 0..3 {
            reg.add_period(PeriodKind::Period, None);
        }
        reg.add_period(PeriodKind::Exam, None);
        for _ in 0..3 {
            reg.add_period(PeriodKind::Period, None);
        }
        reg.add_period(PeriodKind::Exam, None);
        reg
    }

    #[test]
    fn semester_average_of_first_group() {
        let mut reg = PeriodRegistry::new();
        for _ in 0..3 {
            reg.add_period(PeriodKind::Period, None);
        }
        reg.add_period(PeriodKind::Exam, None);
        let subjects = records(json!([{ "subject": "Math", "p1": 90, "p2": 80, "p3": 70, "exam1": 60 }]));
        let matrix = GradeMatrix::collect(&subjects, &reg, MissingScore::Absent);
        let groups = reg.semesters();
        let avg = semester_average(&matrix.rows[0], &groups[0], EmptySemester::Absent);
        assert_eq!(avg, Some(75.0));
    }

    #[test]
    fn class_average_counts_every_subject() {
        let mut reg = PeriodRegistry::new();
        reg.add_period(PeriodKind::Period, None);
        let subjects = records(json!([
            { "subject": "Math", "p1": 100 },
            { "subject": "Art", "p1": 0 }
        ]));
        let matrix = GradeMatrix::collect(&subjects, &reg, MissingScore::Absent);
        assert_eq!(period_average(&matrix, "p1"), 50.0);

        // An absent score still counts in the denominator.
        let sparse = records(json!([
            { "subject": "Math", "p1": 100 },
            { "subject": "Art" }
        ]));
        let matrix = GradeMatrix::collect(&sparse, &reg, MissingScore::Absent);
        assert_eq!(period_average(&matrix, "p1"), 50.0);
    }

    #[test]
    fn empty_inputs_average_to_zero() {
        assert_eq!(period_average(&GradeMatrix::default(), "p1"), 0.0);
        assert_eq!(class_average(Vec::<Option<f64>>::new()), 0.0);
        assert_eq!(final_average(&[]), None);
    }

    #[test]
    fn empty_semester_policy_is_selectable() {
        let row = SubjectRow {
            subject: "Math".to_string(),
            comment: String::new(),
            scores: Default::default(),
        };
        assert_eq!(semester_average(&row, &[], EmptySemester::Zero), Some(0.0));
        assert_eq!(semester_average(&row, &[], EmptySemester::Absent), None);
    }

    #[test]
    fn final_average_degrades_to_single_semester() {
        assert_eq!(final_average(&[Some(80.0), Some(90.0)]), Some(85.0));
        assert_eq!(final_average(&[Some(80.0), None]), Some(80.0));
        assert_eq!(final_average(&[None, None]), None);
    }

    #[test]
    fn compute_averages_is_repeatable() {
        let reg = two_semesters();
        let subjects = records(json!([
            { "subject": "Math", "p1": 90, "p2": 80, "p3": 70, "exam1": 60,
              "p4": 100, "p5": 100, "p6": 100, "exam2": 100 },
            { "subject": "Art", "p1": 50, "p2": "", "p3": 50, "exam1": 50 }
        ]));
        let matrix = GradeMatrix::collect(&subjects, &reg, MissingScore::Absent);
        let first = compute_averages(&reg, &matrix, EmptySemester::Absent);
        let second = compute_averages(&reg, &matrix, EmptySemester::Absent);
        assert_eq!(first, second);

        assert_eq!(first.per_subject[0].semester_averages, vec![Some(75.0), Some(100.0)]);
        assert_eq!(first.per_subject[0].final_average, Some(87.5));
        assert_eq!(first.per_subject[1].semester_averages, vec![Some(50.0), None]);
        assert_eq!(first.per_subject[1].final_average, Some(50.0));
        assert_eq!(first.per_subject[1].scored_count, 3);
        assert_eq!(first.per_subject[1].absent_count, 5);

        assert_eq!(first.per_semester, vec![62.5, 50.0]);
        assert_eq!(first.final_class_average, 68.75);
        assert_eq!(first.per_period[0].period_id, "p1");
        assert_eq!(first.per_period[0].average, 70.0);
    }

    #[test]
    fn submission_default_pulls_admin_averages_down() {
        let reg = two_semesters();
        let subjects = records(json!([{ "subject": "Math", "p1": 100 }]));
        let matrix = GradeMatrix::collect(&subjects, &reg, MissingScore::Default(0.0));
        let avgs = compute_averages(&reg, &matrix, EmptySemester::Zero);
        assert_eq!(avgs.per_subject[0].semester_averages, vec![Some(25.0), Some(0.0)]);
        assert_eq!(avgs.per_subject[0].final_average, Some(12.5));
    }
}
