use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys that can appear in a stored grade entry without naming a period.
pub const NON_PERIOD_KEYS: &[&str] = &["subject", "comment", "_id", "id", "__v", "studentId"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Period,
    Exam,
    Semester,
}

impl PeriodKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "period" => Some(Self::Period),
            "exam" => Some(Self::Exam),
            "semester" => Some(Self::Semester),
            _ => None,
        }
    }

    /// Prefix used for generated ids of this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Period => "p",
            Self::Exam => "exam",
            Self::Semester => "sem",
        }
    }

    pub fn infer_from_id(id: &str) -> Self {
        if id.starts_with("exam") {
            Self::Exam
        } else if id.starts_with("sem") {
            Self::Semester
        } else {
            Self::Period
        }
    }

    fn sort_rank(self) -> u8 {
        match self {
            Self::Period => 0,
            Self::Exam => 1,
            Self::Semester => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PeriodKind,
}

impl Period {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: PeriodKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    LastPeriod,
    NotFound(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LastPeriod => "last_period",
            Self::NotFound(_) => "not_found",
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastPeriod => write!(f, "a report card must keep at least one period"),
            Self::NotFound(id) => write!(f, "period not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Ordered set of grading periods owned by one report card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodRegistry {
    periods: Vec<Period>,
}

impl PeriodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops later duplicates so ids stay unique.
    pub fn from_periods(periods: Vec<Period>) -> Self {
        let mut out = Self::new();
        for p in periods {
            if !out.contains(&p.id) {
                out.periods.push(p);
            }
        }
        out
    }

    pub fn defaults() -> Self {
        Self::from_periods(default_periods())
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.periods.iter().any(|p| p.id == id)
    }

    /// Appends a period with the next sequential id for its kind. A colliding
    /// id (possible after removals) falls back to a timestamp-based id.
    pub fn add_period(&mut self, kind: PeriodKind, custom_name: Option<&str>) -> Period {
        let n = self.periods.iter().filter(|p| p.kind == kind).count() + 1;
        let mut id = format!("{}{}", kind.id_prefix(), n);
        if self.contains(&id) {
            let mut stamp = chrono::Utc::now().timestamp_millis();
            loop {
                id = format!("{}{}", kind.id_prefix(), stamp);
                if !self.contains(&id) {
                    break;
                }
                stamp += 1;
            }
        }

        let name = match custom_name.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => default_name(kind, n as u64),
        };
        let period = Period::new(id, name, kind);
        self.periods.push(period.clone());
        period
    }

    /// Leaves the registry untouched when `id` is the only period left.
    pub fn remove_period(&mut self, id: &str) -> Result<Period, RegistryError> {
        let Some(idx) = self.periods.iter().position(|p| p.id == id) else {
            return Err(RegistryError::NotFound(id.to_string()));
        };
        if self.periods.len() <= 1 {
            return Err(RegistryError::LastPeriod);
        }
        Ok(self.periods.remove(idx))
    }

    pub fn semesters(&self) -> Vec<Vec<Period>> {
        group_into_semesters(&self.periods)
    }

    /// Semester-type entries, which label the derived average columns.
    pub fn semester_labels(&self) -> Vec<&Period> {
        self.periods
            .iter()
            .filter(|p| p.kind == PeriodKind::Semester)
            .collect()
    }
}

pub fn ordinal_suffix(n: u64) -> &'static str {
    if (11..=13).contains(&(n % 100)) {
        return "th";
    }
    match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

pub fn ordinal(n: u64) -> String {
    format!("{}{}", n, ordinal_suffix(n))
}

fn default_name(kind: PeriodKind, n: u64) -> String {
    match kind {
        PeriodKind::Period => format!("{} Period", ordinal(n)),
        PeriodKind::Exam => format!("Exam {}", n),
        PeriodKind::Semester => format!("Semester {} Average", n),
    }
}

fn derived_name(id: &str, kind: PeriodKind) -> String {
    let Some(n) = numeric_suffix(id) else {
        return id.to_string();
    };
    match kind {
        PeriodKind::Period => format!("{} Period", ordinal(n)),
        PeriodKind::Exam => format!("{} Exam", ordinal(n)),
        PeriodKind::Semester => format!("{} Semester Average", ordinal(n)),
    }
}

pub fn numeric_suffix(id: &str) -> Option<u64> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    id[digits_start..].parse().ok()
}

/// Canned registry used when stored grades carry no period keys.
pub fn default_periods() -> Vec<Period> {
    vec![
        Period::new("p1", "1st Period", PeriodKind::Period),
        Period::new("p2", "2nd Period", PeriodKind::Period),
        Period::new("p3", "3rd Period", PeriodKind::Period),
        Period::new("exam1", "1st Exam", PeriodKind::Exam),
        Period::new("sem1", "1st Semester Average", PeriodKind::Semester),
        Period::new("p4", "4th Period", PeriodKind::Period),
        Period::new("p5", "5th Period", PeriodKind::Period),
        Period::new("p6", "6th Period", PeriodKind::Period),
        Period::new("exam2", "2nd Exam", PeriodKind::Exam),
        Period::new("sem2", "2nd Semester Average", PeriodKind::Semester),
    ]
}

/// Rebuilds a registry from the key set of one stored score map, in key order.
pub fn derive_from_scores(scores: &serde_json::Map<String, serde_json::Value>) -> PeriodRegistry {
    let periods: Vec<Period> = scores
        .keys()
        .filter(|k| !NON_PERIOD_KEYS.contains(&k.as_str()))
        .filter(|k| !k.trim().is_empty())
        .map(|k| {
            let kind = PeriodKind::infer_from_id(k);
            Period::new(k.clone(), derived_name(k, kind), kind)
        })
        .collect();

    if periods.is_empty() {
        return PeriodRegistry::defaults();
    }
    PeriodRegistry::from_periods(periods)
}

/// Splits periods into semester groups, closing a group after each exam.
/// Semester-type entries are derived columns and never join a group. Inside
/// a group, regular periods are ordered by numeric suffix ahead of the exam.
pub fn group_into_semesters(periods: &[Period]) -> Vec<Vec<Period>> {
    let mut groups: Vec<Vec<Period>> = Vec::new();
    let mut current: Vec<Period> = Vec::new();

    for p in periods.iter().filter(|p| p.kind != PeriodKind::Semester) {
        current.push(p.clone());
        if p.kind == PeriodKind::Exam {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() || groups.is_empty() {
        groups.push(current);
    }

    for g in &mut groups {
        g.sort_by_key(|p| (p.kind.sort_rank(), numeric_suffix(&p.id).unwrap_or(u64::MAX)));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(group: &[Period]) -> Vec<&str> {
        group.iter().map(|p| p.id.as_str()).collect()
    }

    fn registry_of(ids: &[&str]) -> Vec<Period> {
        ids.iter()
            .map(|id| {
                let kind = PeriodKind::infer_from_id(id);
                Period::new(*id, derived_name(id, kind), kind)
            })
            .collect()
    }

    #[test]
    fn add_period_assigns_sequential_ids_and_ordinal_names() {
        let mut reg = PeriodRegistry::new();
        let a = reg.add_period(PeriodKind::Period, None);
        let b = reg.add_period(PeriodKind::Period, None);
        assert_eq!((a.id.as_str(), a.name.as_str()), ("p1", "1st Period"));
        assert_eq!((b.id.as_str(), b.name.as_str()), ("p2", "2nd Period"));

        let e = reg.add_period(PeriodKind::Exam, None);
        assert_eq!((e.id.as_str(), e.name.as_str()), ("exam1", "Exam 1"));

        let c = reg.add_period(PeriodKind::Period, Some("  Midterm review "));
        assert_eq!(c.id, "p3");
        assert_eq!(c.name, "Midterm review");
    }

    #[test]
    fn add_period_self_heals_on_id_collision() {
        let mut reg = PeriodRegistry::new();
        reg.add_period(PeriodKind::Period, None);
        reg.add_period(PeriodKind::Period, None);
        reg.add_period(PeriodKind::Period, None);
        reg.remove_period("p2").expect("remove p2");

        // Two periods remain, so the next sequential id is p3, which is taken.
        let p = reg.add_period(PeriodKind::Period, None);
        assert_ne!(p.id, "p3");
        assert!(p.id.starts_with('p'));
        assert_eq!(reg.len(), 3);
        let mut seen: Vec<&str> = reg.periods().iter().map(|p| p.id.as_str()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn remove_last_period_is_rejected_and_leaves_registry_unchanged() {
        let mut reg = PeriodRegistry::new();
        reg.add_period(PeriodKind::Period, None);
        let before = reg.clone();
        assert_eq!(reg.remove_period("p1"), Err(RegistryError::LastPeriod));
        assert_eq!(reg, before);
        assert_eq!(
            reg.remove_period("nope"),
            Err(RegistryError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn ordinal_suffix_handles_teens() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(112), "112th");
    }

    #[test]
    fn derive_infers_kind_and_skips_non_period_keys() {
        let map = json!({
            "_id": "abc",
            "subject": "Math",
            "comment": "ok",
            "p1": 90,
            "p2": 80,
            "exam1": 70,
            "sem1": 80
        });
        let reg = derive_from_scores(map.as_object().expect("object"));
        let got: Vec<(&str, &str, PeriodKind)> = reg
            .periods()
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str(), p.kind))
            .collect();
        assert_eq!(
            got,
            vec![
                ("p1", "1st Period", PeriodKind::Period),
                ("p2", "2nd Period", PeriodKind::Period),
                ("exam1", "1st Exam", PeriodKind::Exam),
                ("sem1", "1st Semester Average", PeriodKind::Semester),
            ]
        );
    }

    #[test]
    fn derive_from_empty_map_uses_canned_defaults() {
        let map = json!({ "subject": "Math" });
        let reg = derive_from_scores(map.as_object().expect("object"));
        assert_eq!(reg.len(), 10);
        assert_eq!(
            ids(reg.periods()),
            vec!["p1", "p2", "p3", "exam1", "sem1", "p4", "p5", "p6", "exam2", "sem2"]
        );
        assert_eq!(reg.periods()[9].name, "2nd Semester Average");
    }

    #[test]
    fn semesters_close_after_each_exam() {
        let periods = registry_of(&["p1", "p2", "p3", "exam1", "p4", "p5", "p6", "exam2"]);
        let groups = group_into_semesters(&periods);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["p1", "p2", "p3", "exam1"]);
        assert_eq!(ids(&groups[1]), vec!["p4", "p5", "p6", "exam2"]);
    }

    #[test]
    fn semesters_without_exam_form_one_partial_group() {
        let periods = registry_of(&["p1", "p2"]);
        let groups = group_into_semesters(&periods);
        assert_eq!(groups.len(), 1);
        assert_eq!(ids(&groups[0]), vec!["p1", "p2"]);

        let trailing = group_into_semesters(&registry_of(&["p1", "exam1", "p2"]));
        assert_eq!(trailing.len(), 2);
        assert_eq!(ids(&trailing[1]), vec!["p2"]);
    }

    #[test]
    fn semesters_of_nothing_is_one_empty_group() {
        let groups = group_into_semesters(&[]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_empty());
    }

    #[test]
    fn semesters_skip_semester_columns_and_order_within_group() {
        let periods = registry_of(&["p3", "p1", "p2", "exam1", "sem1", "p4", "exam2", "sem2"]);
        let groups = group_into_semesters(&periods);
        assert_eq!(groups.len(), 2);
        assert_eq!(ids(&groups[0]), vec!["p1", "p2", "p3", "exam1"]);
        assert_eq!(ids(&groups[1]), vec!["p4", "exam2"]);
    }
}
