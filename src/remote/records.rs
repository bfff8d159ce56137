//! Validated records parsed from raw bundle resources.
//!
//! Each `parse` consumes one resource and either yields a typed record or a
//! `DataShapeError`; callers skip the record on error.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::DataShapeError;
use crate::models::ProgramType;

/// Seconds embedded in a task description, e.g. `"seconds": 1260`,
/// `seconds=1260` or `1260 seconds`.
static SECONDS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:\bseconds?"?\s*[:=]\s*"?(\d+))|(?:\b(\d+)\s*(?:seconds?|secs?)\b)"#).unwrap()
});

const DEPARTMENTS_EXTENSION_SUFFIX: &str = "departments";

// ═══════════════════════════════════════════════════════════
// Raw shapes
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct Reference {
    reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Coding {
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CodeableConcept {
    #[serde(default)]
    coding: Vec<Coding>,
    text: Option<String>,
}

impl CodeableConcept {
    fn first_code(&self) -> Option<&str> {
        self.coding
            .iter()
            .filter_map(|c| c.code.as_deref())
            .map(str::trim)
            .find(|c| !c.is_empty())
            .or_else(|| self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct Extension {
    url: Option<String>,
    #[serde(rename = "valueString")]
    value_string: Option<String>,
    #[serde(default)]
    extension: Vec<Value>,
}

fn from_value<T: for<'de> Deserialize<'de>>(resource: &'static str, value: Value) -> Result<T, DataShapeError> {
    serde_json::from_value(value).map_err(|e| DataShapeError::Malformed {
        resource,
        reason: e.to_string(),
    })
}

/// `"Patient/abc"` → `"abc"`; a bare id is returned as-is.
fn patient_id_from_reference(resource: &'static str, reference: Option<&Reference>) -> Result<String, DataShapeError> {
    let raw = reference
        .and_then(|r| r.reference.as_deref())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(DataShapeError::MissingField { resource, field: "patient reference" })?;
    let id = raw.rsplit('/').next().unwrap_or(raw).trim();
    if id.is_empty() {
        return Err(DataShapeError::InvalidValue {
            resource,
            field: "patient reference",
            value: raw.to_string(),
        });
    }
    Ok(id.to_string())
}

fn program_from(resource: &'static str, concept: Option<&CodeableConcept>) -> Result<ProgramType, DataShapeError> {
    let code = concept
        .and_then(CodeableConcept::first_code)
        .ok_or(DataShapeError::MissingField { resource, field: "program code" })?;
    ProgramType::from_code(code).ok_or_else(|| DataShapeError::UnknownProgram {
        resource,
        code: code.to_string(),
    })
}

// ═══════════════════════════════════════════════════════════
// Organization
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawOrganization {
    id: Option<Value>,
    name: Option<String>,
    #[serde(default)]
    alias: Vec<String>,
    active: Option<bool>,
    #[serde(default)]
    extension: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRecord {
    pub id: i64,
    pub name: String,
    pub alias: Option<String>,
    pub active: bool,
    pub departments: Vec<String>,
}

impl OrganizationRecord {
    const RESOURCE: &'static str = "Organization";

    pub fn parse(value: Value) -> Result<Self, DataShapeError> {
        let raw: RawOrganization = from_value(Self::RESOURCE, value)?;

        let id = match raw.id {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|id| *id > 0)
        .ok_or(DataShapeError::MissingField {
            resource: Self::RESOURCE,
            field: "numeric id",
        })?;

        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(DataShapeError::MissingField {
                resource: Self::RESOURCE,
                field: "name",
            })?;

        Ok(Self {
            id,
            name,
            alias: raw
                .alias
                .into_iter()
                .map(|a| a.trim().to_string())
                .find(|a| !a.is_empty()),
            active: raw.active.unwrap_or(true),
            departments: departments_from_extensions(&raw.extension),
        })
    }
}

/// Department labels from the nested departments extension. Entries that
/// are not well-formed are skipped; duplicates keep their first position.
fn departments_from_extensions(extensions: &[Value]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let outer = extensions
        .iter()
        .filter_map(|v| serde_json::from_value::<Extension>(v.clone()).ok())
        .filter(|e| {
            e.url
                .as_deref()
                .is_some_and(|u| u.trim_end_matches('/').ends_with(DEPARTMENTS_EXTENSION_SUFFIX))
        });

    for ext in outer {
        for inner in &ext.extension {
            let Ok(entry) = serde_json::from_value::<Extension>(inner.clone()) else {
                continue;
            };
            let Some(label) = entry.value_string.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
                continue;
            };
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
    }
    labels
}

// ═══════════════════════════════════════════════════════════
// Patient
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawPatient {
    id: Option<String>,
    active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub id: String,
    /// Set when the platform marks the patient `active: false`.
    pub inactive: bool,
}

impl PatientRecord {
    const RESOURCE: &'static str = "Patient";

    pub fn parse(value: Value) -> Result<Self, DataShapeError> {
        let raw: RawPatient = from_value(Self::RESOURCE, value)?;
        let id = raw
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(DataShapeError::MissingField {
                resource: Self::RESOURCE,
                field: "id",
            })?;
        Ok(Self {
            id,
            inactive: raw.active == Some(false),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Enrollment (EpisodeOfCare)
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawEpisodeOfCare {
    status: Option<String>,
    patient: Option<Reference>,
    #[serde(default, rename = "type")]
    kind: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub patient_id: String,
    pub program: ProgramType,
    /// The episode's own status is `active`. Patient-level inactivity is
    /// applied later from the patient index.
    pub status_active: bool,
}

impl EnrollmentRecord {
    const RESOURCE: &'static str = "EpisodeOfCare";

    pub fn parse(value: Value) -> Result<Self, DataShapeError> {
        let raw: RawEpisodeOfCare = from_value(Self::RESOURCE, value)?;
        let patient_id = patient_id_from_reference(Self::RESOURCE, raw.patient.as_ref())?;
        let concept = raw.kind.iter().find(|c| c.first_code().is_some());
        let program = program_from(Self::RESOURCE, concept)?;
        Ok(Self {
            patient_id,
            program,
            status_active: raw
                .status
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("active")),
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Time task
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawPeriod {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(rename = "for")]
    subject: Option<Reference>,
    code: Option<CodeableConcept>,
    description: Option<String>,
    #[serde(rename = "executionPeriod")]
    execution_period: Option<RawPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeTaskRecord {
    pub patient_id: String,
    pub program: ProgramType,
    pub minutes: u32,
}

impl TimeTaskRecord {
    const RESOURCE: &'static str = "Task";

    pub fn parse(value: Value) -> Result<Self, DataShapeError> {
        let raw: RawTask = from_value(Self::RESOURCE, value)?;
        let patient_id = patient_id_from_reference(Self::RESOURCE, raw.subject.as_ref())?;
        let program = program_from(Self::RESOURCE, raw.code.as_ref())?;

        let minutes = match raw.description.as_deref().and_then(seconds_in_description) {
            Some(seconds) => seconds / 60,
            None => minutes_in_period(raw.execution_period.as_ref())?,
        };

        Ok(Self {
            patient_id,
            program,
            minutes: u32::try_from(minutes).unwrap_or(u32::MAX),
        })
    }
}

fn seconds_in_description(description: &str) -> Option<u64> {
    let caps = SECONDS_PATTERN.captures(description)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Whole minutes between start and end, rounded down.
fn minutes_in_period(period: Option<&RawPeriod>) -> Result<u64, DataShapeError> {
    const RESOURCE: &str = TimeTaskRecord::RESOURCE;
    let period = period.ok_or(DataShapeError::MissingField {
        resource: RESOURCE,
        field: "duration",
    })?;
    let parse = |field: &'static str, raw: Option<&str>| -> Result<DateTime<Utc>, DataShapeError> {
        let raw = raw.ok_or(DataShapeError::MissingField { resource: RESOURCE, field })?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| DataShapeError::InvalidValue {
                resource: RESOURCE,
                field,
                value: raw.to_string(),
            })
    };
    let start = parse("executionPeriod.start", period.start.as_deref())?;
    let end = parse("executionPeriod.end", period.end.as_deref())?;
    if end < start {
        return Err(DataShapeError::InvalidValue {
            resource: RESOURCE,
            field: "executionPeriod",
            value: format!("end {end} before start {start}"),
        });
    }
    Ok((end - start).num_minutes() as u64)
}

// ═══════════════════════════════════════════════════════════
// Care plan
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RawCarePlan {
    status: Option<String>,
    #[serde(default)]
    category: Vec<CodeableConcept>,
}

/// Programs a care plan documents treatment for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarePlanRecord {
    pub active: bool,
    pub programs: Vec<ProgramType>,
}

impl CarePlanRecord {
    const RESOURCE: &'static str = "CarePlan";

    pub fn parse(value: Value) -> Result<Self, DataShapeError> {
        let raw: RawCarePlan = from_value(Self::RESOURCE, value)?;
        let mut programs: Vec<ProgramType> = raw
            .category
            .iter()
            .flat_map(|c| c.coding.iter())
            .filter_map(|c| c.code.as_deref())
            .filter_map(ProgramType::from_code)
            .collect();
        programs.sort();
        programs.dedup();
        if programs.is_empty() {
            return Err(DataShapeError::MissingField {
                resource: Self::RESOURCE,
                field: "program category",
            });
        }
        Ok(Self {
            active: raw
                .status
                .as_deref()
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("active")),
            programs,
        })
    }
}
