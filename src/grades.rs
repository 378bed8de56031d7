use crate::periods::{PeriodKind, PeriodRegistry, NON_PERIOD_KEYS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What to do with a score that is blank, malformed or out of range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissingScore {
    /// Substitute a fixed value (90 for placeholder renders, 0 for submissions).
    Default(f64),
    /// Leave the cell absent; averages skip it.
    Absent,
}

/// One subject row as stored: scores keep whatever the caller sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub scores: Map<String, Value>,
}

impl SubjectRecord {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Reads a flat document entry (`{ subject, comment?, p1: 90, ... }`).
    pub fn from_flat_entry(entry: &Map<String, Value>) -> Self {
        let subject = entry
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let comment = entry
            .get("comment")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let scores = entry
            .iter()
            .filter(|(k, _)| !NON_PERIOD_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            subject,
            comment,
            scores,
        }
    }

    /// Removes one period's score, keeping the order of the rest.
    pub fn drop_score(&mut self, period_id: &str) {
        self.scores = std::mem::take(&mut self.scores)
            .into_iter()
            .filter(|(k, _)| k.as_str() != period_id)
            .collect();
    }

    pub fn to_flat_entry(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("subject".to_string(), Value::String(self.subject.clone()));
        if !self.comment.is_empty() {
            out.insert("comment".to_string(), Value::String(self.comment.clone()));
        }
        for (k, v) in &self.scores {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

/// Parses a raw score. Anything that is not a finite number in 0..=100
/// (after trimming, for text) is absent.
pub fn parse_score(raw: &Value) -> Option<f64> {
    let v = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if v.is_finite() && (0.0..=100.0).contains(&v) {
        Some(v)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject: String,
    pub comment: String,
    pub scores: BTreeMap<String, f64>,
}

impl SubjectRow {
    pub fn score(&self, period_id: &str) -> Option<f64> {
        self.scores.get(period_id).copied()
    }
}

/// Parsed per-subject, per-period scores for one report card.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeMatrix {
    pub rows: Vec<SubjectRow>,
}

impl GradeMatrix {
    /// Reads every subject's score for every scored period in the registry.
    /// Semester columns are derived and never read from input.
    pub fn collect(subjects: &[SubjectRecord], periods: &PeriodRegistry, missing: MissingScore) -> Self {
        let rows = subjects
            .iter()
            .map(|s| {
                let mut scores = BTreeMap::new();
                for p in periods.periods() {
                    if p.kind == PeriodKind::Semester {
                        continue;
                    }
                    let parsed = s.scores.get(&p.id).and_then(parse_score);
                    let resolved = match (parsed, missing) {
                        (Some(v), _) => Some(v),
                        (None, MissingScore::Default(d)) => Some(d),
                        (None, MissingScore::Absent) => None,
                    };
                    if let Some(v) = resolved {
                        scores.insert(p.id.clone(), v);
                    }
                }
                SubjectRow {
                    subject: s.subject.clone(),
                    comment: s.comment.clone(),
                    scores,
                }
            })
            .collect();
        Self { rows }
    }

    /// Scores as they would be stored after a submission with this matrix.
    pub fn to_records(&self, periods: &PeriodRegistry) -> Vec<SubjectRecord> {
        self.rows
            .iter()
            .map(|r| {
                let mut scores = Map::new();
                for p in periods.periods() {
                    if let Some(v) = r.score(&p.id) {
                        scores.insert(p.id.clone(), Value::from(v));
                    }
                }
                SubjectRecord {
                    subject: r.subject.clone(),
                    comment: r.comment.clone(),
                    scores,
                }
            })
            .collect()
    }
}
