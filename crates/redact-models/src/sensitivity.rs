//! Sensitivity profiles: per-class minimum confidence.
//!
//! Three named levels ship with the crate:
//!
//! - `high`: low thresholds, redacts aggressively (documents at 0.3)
//! - `medium`: every class at 0.5
//! - `low`: every class at 0.7
//!
//! Explicit profiles can override any class.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::detection::normalize_label;

/// Errors building or validating a profile.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("threshold for '{label}' must be within [0, 1], got {value}")]
    ThresholdOutOfRange { label: String, value: f64 },

    #[error("empty class label in sensitivity profile")]
    EmptyLabel,

    #[error("invalid threshold override '{0}', expected class=value")]
    InvalidOverride(String),

    #[error("class '{0}' has more than one threshold")]
    DuplicateLabel(String),
}

/// Named sensitivity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    High,
    #[default]
    Medium,
    Low,
}

impl SensitivityLevel {
    /// All available levels.
    pub const ALL: &'static [SensitivityLevel] = &[
        SensitivityLevel::High,
        SensitivityLevel::Medium,
        SensitivityLevel::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityLevel::High => "high",
            SensitivityLevel::Medium => "medium",
            SensitivityLevel::Low => "low",
        }
    }

    /// The profile this level stands for.
    pub fn profile(&self) -> SensitivityProfile {
        let (default_threshold, overrides): (f64, &[(&str, f64)]) = match self {
            SensitivityLevel::High => (
                0.3,
                &[
                    ("passport", 0.3),
                    ("driver_license", 0.3),
                    ("credit_card", 0.3),
                    ("social_security_card", 0.3),
                    ("face", 0.4),
                    ("person", 0.5),
                ],
            ),
            SensitivityLevel::Medium => (0.5, &[]),
            SensitivityLevel::Low => (0.7, &[]),
        };

        SensitivityProfile {
            name: self.as_str().to_string(),
            default_threshold,
            thresholds: overrides
                .iter()
                .map(|(label, t)| (label.to_string(), *t))
                .collect(),
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SensitivityLevel {
    type Err = SensitivityLevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "high_sensitivity" => Ok(SensitivityLevel::High),
            "medium" | "medium_sensitivity" => Ok(SensitivityLevel::Medium),
            "low" | "low_sensitivity" => Ok(SensitivityLevel::Low),
            _ => Err(SensitivityLevelParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown sensitivity level: {0}")]
pub struct SensitivityLevelParseError(String);

/// Mapping from class label to the minimum confidence that class needs to
/// be redacted.
///
/// Deserialised profiles go through the same label normalisation and range
/// checks as [`SensitivityProfile::set_threshold`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "ProfileDocument")]
pub struct SensitivityProfile {
    /// Profile name, for logs and results
    pub name: String,
    /// Threshold for classes without an explicit entry
    pub default_threshold: f64,
    /// Per-class thresholds keyed by normalized label
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
}

impl SensitivityProfile {
    /// Create a profile with only a default threshold.
    pub fn new(name: impl Into<String>, default_threshold: f64) -> Result<Self, ProfileError> {
        check_range("default", default_threshold)?;
        Ok(Self {
            name: name.into(),
            default_threshold,
            thresholds: BTreeMap::new(),
        })
    }

    /// Builder-style threshold override.
    pub fn with_threshold(mut self, label: &str, threshold: f64) -> Result<Self, ProfileError> {
        self.set_threshold(label, threshold)?;
        Ok(self)
    }

    /// Set the threshold for one class.
    pub fn set_threshold(&mut self, label: &str, threshold: f64) -> Result<(), ProfileError> {
        let label = normalize_label(label);
        if label.is_empty() {
            return Err(ProfileError::EmptyLabel);
        }
        check_range(&label, threshold)?;
        self.thresholds.insert(label, threshold);
        Ok(())
    }

    /// Apply a `class=value` override as given on a command line.
    pub fn apply_override(&mut self, spec: &str) -> Result<(), ProfileError> {
        let (label, value) = spec
            .split_once('=')
            .ok_or_else(|| ProfileError::InvalidOverride(spec.to_string()))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| ProfileError::InvalidOverride(spec.to_string()))?;
        self.set_threshold(label, value)
    }

    /// Threshold that applies to `label`.
    pub fn threshold_for(&self, label: &str) -> f64 {
        let normalized = normalize_label(label);
        self.thresholds
            .get(&normalized)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// Whether a detection of `label` at `confidence` clears the profile.
    #[inline]
    pub fn passes(&self, label: &str, confidence: f64) -> bool {
        confidence >= self.threshold_for(label)
    }

    /// Check every threshold. Needed when `thresholds` was edited directly.
    pub fn validate(&self) -> Result<(), ProfileError> {
        check_range("default", self.default_threshold)?;
        for (label, value) in &self.thresholds {
            if label.is_empty() {
                return Err(ProfileError::EmptyLabel);
            }
            if *label != normalize_label(label) {
                return Err(ProfileError::InvalidOverride(label.clone()));
            }
            check_range(label, *value)?;
        }
        Ok(())
    }
}

/// Wire form of a profile, keys as the author wrote them.
#[derive(Deserialize)]
struct ProfileDocument {
    #[serde(default = "custom_name")]
    name: String,
    #[serde(default = "medium_default")]
    default_threshold: f64,
    #[serde(default)]
    thresholds: BTreeMap<String, f64>,
}

fn custom_name() -> String {
    "custom".to_string()
}

fn medium_default() -> f64 {
    SensitivityLevel::Medium.profile().default_threshold
}

impl TryFrom<ProfileDocument> for SensitivityProfile {
    type Error = ProfileError;

    fn try_from(doc: ProfileDocument) -> Result<Self, Self::Error> {
        let mut profile = SensitivityProfile::new(doc.name, doc.default_threshold)?;
        for (label, value) in doc.thresholds {
            if profile.thresholds.contains_key(&normalize_label(&label)) {
                return Err(ProfileError::DuplicateLabel(label));
            }
            profile.set_threshold(&label, value)?;
        }
        Ok(profile)
    }
}

impl Default for SensitivityProfile {
    fn default() -> Self {
        SensitivityLevel::default().profile()
    }
}

impl From<SensitivityLevel> for SensitivityProfile {
    fn from(level: SensitivityLevel) -> Self {
        level.profile()
    }
}

fn check_range(label: &str, value: f64) -> Result<(), ProfileError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProfileError::ThresholdOutOfRange {
            label: label.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!("high".parse::<SensitivityLevel>().unwrap(), SensitivityLevel::High);
        assert_eq!(
            "low_sensitivity".parse::<SensitivityLevel>().unwrap(),
            SensitivityLevel::Low
        );
        assert!("extreme".parse::<SensitivityLevel>().is_err());
    }

    #[test]
    fn test_high_profile_thresholds() {
        let profile = SensitivityLevel::High.profile();
        assert_eq!(profile.threshold_for("passport"), 0.3);
        assert_eq!(profile.threshold_for("Face"), 0.4);
        assert_eq!(profile.threshold_for("person"), 0.5);
        assert_eq!(profile.threshold_for("screen"), 0.3);
        assert_eq!(SensitivityLevel::Low.profile().threshold_for("face"), 0.7);
    }

    #[test]
    fn test_passes_is_inclusive() {
        let profile = SensitivityProfile::new("custom", 0.5)
            .unwrap()
            .with_threshold("id card", 0.9)
            .unwrap();
        assert!(!profile.passes("id_card", 0.8));
        assert!(profile.passes("id_card", 0.9));
        assert!(profile.passes("face", 0.5));
        assert!(!profile.passes("face", 0.49));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(SensitivityProfile::new("bad", 1.5).is_err());
        let err = SensitivityProfile::default()
            .with_threshold("face", -0.1)
            .unwrap_err();
        assert!(matches!(err, ProfileError::ThresholdOutOfRange { .. }));
    }

    #[test]
    fn test_apply_override() {
        let mut profile = SensitivityProfile::default();
        profile.apply_override("credit-card=0.25").unwrap();
        assert_eq!(profile.threshold_for("credit_card"), 0.25);
        assert!(profile.apply_override("face").is_err());
        assert!(profile.apply_override("face=abc").is_err());
    }

    #[test]
    fn test_deserialize_checks_range() {
        let result = serde_json::from_str::<SensitivityProfile>(
            r#"{"name":"x","default_threshold":0.5,"thresholds":{"face":2.0}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_normalizes_labels() {
        let profile: SensitivityProfile =
            serde_json::from_str(r#"{"thresholds":{"ID Card":0.9}}"#).unwrap();
        assert_eq!(profile.name, "custom");
        assert_eq!(profile.threshold_for("id_card"), 0.9);
        assert!(!profile.passes("id_card", 0.8));
        assert!(profile.thresholds.contains_key("id_card"));
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_colliding_labels() {
        let result = serde_json::from_str::<SensitivityProfile>(
            r#"{"thresholds":{"id card":0.9,"ID-Card":0.4}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_raw_keys() {
        let mut profile = SensitivityProfile::default();
        profile.thresholds.insert("ID Card".to_string(), 0.9);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip_keeps_thresholds() {
        let profile = SensitivityLevel::High.profile();
        let json = serde_json::to_string(&profile).unwrap();
        let back: SensitivityProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }
}
