use crate::db;
use crate::format::DisplayMode;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Process-level settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub log_level: String,
    pub workspace: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let workspace = std::env::var("REPORTCARDD_WORKSPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        Self {
            log_level,
            workspace,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Grading,
    Views,
    Security,
}

impl SetupSection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "views" => Some(Self::Views),
            "security" => Some(Self::Security),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Views => "setup.views",
            Self::Security => "setup.security",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "placeholderDefault": 90.0,
            "submissionDefault": 0.0,
            "displayMode": "numeric"
        }),
        SetupSection::Views => json!({
            "adminPrecision": 2,
            "reportCardPrecision": 2,
            "dashboardPrecision": 1
        }),
        SetupSection::Security => json!({
            "superAdmins": []
        }),
    }
}

/// Stored section values merged over the defaults.
pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut merged = default_section(section);
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, section.key())? {
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in stored {
                obj.insert(k, v);
            }
        }
    }
    Ok(merged)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradingSettings {
    pub placeholder_default: f64,
    pub submission_default: f64,
    pub display_mode: DisplayMode,
    pub admin_precision: usize,
    pub report_card_precision: usize,
    pub dashboard_precision: usize,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            placeholder_default: 90.0,
            submission_default: 0.0,
            display_mode: DisplayMode::Numeric,
            admin_precision: 2,
            report_card_precision: 2,
            dashboard_precision: 1,
        }
    }
}

impl GradingSettings {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let grading = load_section(conn, SetupSection::Grading)?;
        let views = load_section(conn, SetupSection::Views)?;
        Ok(Self::from_sections(&grading, &views))
    }

    pub fn from_sections(grading: &Value, views: &Value) -> Self {
        let d = Self::default();
        let precision = |key: &str, fallback: usize| {
            views
                .get(key)
                .and_then(|v| v.as_u64())
                .map(|n| n.min(4) as usize)
                .unwrap_or(fallback)
        };
        Self {
            placeholder_default: grading
                .get("placeholderDefault")
                .and_then(|v| v.as_f64())
                .unwrap_or(d.placeholder_default),
            submission_default: grading
                .get("submissionDefault")
                .and_then(|v| v.as_f64())
                .unwrap_or(d.submission_default),
            display_mode: grading
                .get("displayMode")
                .and_then(|v| v.as_str())
                .and_then(DisplayMode::parse)
                .unwrap_or(d.display_mode),
            admin_precision: precision("adminPrecision", d.admin_precision),
            report_card_precision: precision("reportCardPrecision", d.report_card_precision),
            dashboard_precision: precision("dashboardPrecision", d.dashboard_precision),
        }
    }
}

pub fn super_admins(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let security = load_section(conn, SetupSection::Security)?;
    Ok(security
        .get("superAdmins")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_sections() {
        let g = GradingSettings::from_sections(
            &default_section(SetupSection::Grading),
            &default_section(SetupSection::Views),
        );
        assert_eq!(g, GradingSettings::default());
    }

    #[test]
    fn section_values_override_defaults() {
        let g = GradingSettings::from_sections(
            &json!({ "placeholderDefault": 85, "displayMode": "letter" }),
            &json!({ "dashboardPrecision": 3, "adminPrecision": 9 }),
        );
        assert_eq!(g.placeholder_default, 85.0);
        assert_eq!(g.submission_default, 0.0);
        assert_eq!(g.display_mode, DisplayMode::Letter);
        assert_eq!(g.dashboard_precision, 3);
        assert_eq!(g.admin_precision, 4);
        assert_eq!(g.report_card_precision, 2);
    }
}
