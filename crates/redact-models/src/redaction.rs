//! Redaction modes and blur strength.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Visual transform applied to a sensitive region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// Coarse mosaic of block averages.
    Pixelate,
    /// Gaussian blur sized to the region.
    #[default]
    Blur,
    /// Solid fill.
    Blackout,
}

impl RedactionMode {
    /// All available modes.
    pub const ALL: &'static [RedactionMode] = &[
        RedactionMode::Pixelate,
        RedactionMode::Blur,
        RedactionMode::Blackout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RedactionMode::Pixelate => "pixelate",
            RedactionMode::Blur => "blur",
            RedactionMode::Blackout => "blackout",
        }
    }

    /// Whether applying the mode twice yields the same pixels as once.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, RedactionMode::Blackout)
    }
}

impl fmt::Display for RedactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RedactionMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pixelate" | "pixelation" | "mosaic" => Ok(RedactionMode::Pixelate),
            "blur" | "gaussian" => Ok(RedactionMode::Blur),
            "blackout" | "black" | "fill" => Ok(RedactionMode::Blackout),
            _ => Err(ModeParseError::Mode(s.to_string())),
        }
    }
}

/// Blur intensity, scaling the kernel with the region size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlurStrength {
    Light,
    #[default]
    Medium,
    Heavy,
}

impl BlurStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlurStrength::Light => "light",
            BlurStrength::Medium => "medium",
            BlurStrength::Heavy => "heavy",
        }
    }

    /// Kernel size as a fraction of the region's longest side.
    pub fn multiplier(&self) -> f64 {
        match self {
            BlurStrength::Light => 0.04,
            BlurStrength::Medium => 0.06,
            BlurStrength::Heavy => 0.08,
        }
    }
}

impl fmt::Display for BlurStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BlurStrength {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(BlurStrength::Light),
            "medium" => Ok(BlurStrength::Medium),
            "heavy" => Ok(BlurStrength::Heavy),
            _ => Err(ModeParseError::BlurStrength(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModeParseError {
    #[error("Unknown redaction mode: {0}")]
    Mode(String),
    #[error("Unknown blur strength: {0}")]
    BlurStrength(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("Pixelate".parse::<RedactionMode>().unwrap(), RedactionMode::Pixelate);
        assert_eq!("blackout".parse::<RedactionMode>().unwrap(), RedactionMode::Blackout);
        assert!("smudge".parse::<RedactionMode>().is_err());
        assert_eq!(RedactionMode::default(), RedactionMode::Blur);
    }

    #[test]
    fn test_blur_strength() {
        assert_eq!("heavy".parse::<BlurStrength>().unwrap().multiplier(), 0.08);
        assert_eq!(BlurStrength::Light.to_string(), "light");
    }
}
