use serde::{Deserialize, Serialize};

/// Lowest score that still passes. Drives the letter scale and failing flags.
pub const PASS_THRESHOLD: f64 = 60.0;

/// Scores below this are flagged for attention in the dashboard view. This
/// is a highlight only and never changes the letter.
pub const ATTENTION_THRESHOLD: f64 = 70.0;

const LETTER_SCALE: &[(f64, LetterGrade)] = &[
    (90.0, LetterGrade::A),
    (80.0, LetterGrade::B),
    (70.0, LetterGrade::C),
    (PASS_THRESHOLD, LetterGrade::D),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

pub fn letter_grade(score: f64) -> LetterGrade {
    LETTER_SCALE
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, g)| *g)
        .unwrap_or(LetterGrade::F)
}

pub fn is_failing(score: f64) -> bool {
    score < PASS_THRESHOLD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Numeric,
    Letter,
}

impl DisplayMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" | "number" => Some(Self::Numeric),
            "letter" => Some(Self::Letter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Letter => "letter",
        }
    }
}

/// Half-up rounding to `decimals` places.
pub fn round_off(x: f64, decimals: usize) -> f64 {
    let scale = 10_f64.powi(decimals as i32);
    ((scale * x) + 0.5).floor() / scale
}

/// Renders a score for display. Absent scores render as `-`.
pub fn format_score(score: Option<f64>, mode: DisplayMode, precision: usize) -> String {
    let Some(v) = score else {
        return "-".to_string();
    };
    match mode {
        DisplayMode::Numeric => format!("{:.*}", precision, round_off(v, precision)),
        DisplayMode::Letter => letter_grade(v).as_str().to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extremes {
    pub max: Option<String>,
    pub min: Option<String>,
}

/// Finds the highest and lowest scored periods for one subject. Nothing is
/// flagged unless at least two scores exist and they are not all equal.
/// Ties go to the earliest period.
pub fn highlight_extremes(scores: &[(&str, Option<f64>)]) -> Extremes {
    let present: Vec<(&str, f64)> = scores
        .iter()
        .filter_map(|(id, v)| v.filter(|x| x.is_finite()).map(|x| (*id, x)))
        .collect();
    if present.len() < 2 {
        return Extremes::default();
    }

    let mut max = present[0];
    let mut min = present[0];
    for &(id, v) in &present[1..] {
        if v > max.1 {
            max = (id, v);
        }
        if v < min.1 {
            min = (id, v);
        }
    }
    if max.1 == min.1 {
        return Extremes::default();
    }
    Extremes {
        max: Some(max.0.to_string()),
        min: Some(min.0.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_boundaries_are_inclusive() {
        assert_eq!(letter_grade(59.99), LetterGrade::F);
        assert_eq!(letter_grade(60.0), LetterGrade::D);
        assert_eq!(letter_grade(69.99), LetterGrade::D);
        assert_eq!(letter_grade(70.0), LetterGrade::C);
        assert_eq!(letter_grade(80.0), LetterGrade::B);
        assert_eq!(letter_grade(89.99), LetterGrade::B);
        assert_eq!(letter_grade(90.0), LetterGrade::A);
        assert_eq!(letter_grade(100.0), LetterGrade::A);
        assert_eq!(letter_grade(0.0), LetterGrade::F);
    }

    #[test]
    fn failing_and_attention_thresholds_stay_distinct() {
        assert!(is_failing(59.5));
        assert!(!is_failing(65.0));
        assert!(65.0 < ATTENTION_THRESHOLD);
        assert_eq!(letter_grade(65.0), LetterGrade::D);
    }

    #[test]
    fn format_respects_mode_and_precision() {
        assert_eq!(format_score(Some(75.0), DisplayMode::Numeric, 2), "75.00");
        assert_eq!(format_score(Some(83.333), DisplayMode::Numeric, 1), "83.3");
        assert_eq!(format_score(Some(83.36), DisplayMode::Numeric, 1), "83.4");
        assert_eq!(format_score(Some(91.0), DisplayMode::Letter, 2), "A");
        assert_eq!(format_score(None, DisplayMode::Numeric, 2), "-");
        assert_eq!(format_score(None, DisplayMode::Letter, 2), "-");
    }

    #[test]
    fn extremes_need_two_distinct_scores() {
        assert_eq!(highlight_extremes(&[("p1", Some(80.0))]), Extremes::default());
        assert_eq!(
            highlight_extremes(&[("p1", Some(80.0)), ("p2", Some(80.0)), ("p3", None)]),
            Extremes::default()
        );

        let e = highlight_extremes(&[
            ("p1", Some(70.0)),
            ("p2", None),
            ("p3", Some(95.0)),
            ("exam1", Some(70.0)),
        ]);
        assert_eq!(e.max.as_deref(), Some("p3"));
        assert_eq!(e.min.as_deref(), Some("p1"));
    }
}
