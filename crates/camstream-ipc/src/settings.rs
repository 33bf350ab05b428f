//! Operator-chosen capture and transport configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest accepted frame rate.
pub const MIN_RATE: u32 = 1;

/// Highest accepted frame rate.
pub const MAX_RATE: u32 = 30;

/// A configuration value was rejected at the settings boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Rate outside 1..=30.
    #[error("rate must be between 1 and 30 fps, got {0}")]
    RateOutOfRange(u32),

    /// Quality outside (0, 1].
    #[error("quality must be greater than 0 and at most 1, got {0}")]
    QualityOutOfRange(f32),

    /// Resolution string not in the supported set.
    #[error("unknown resolution '{0}' (expected 640x480, 1280x720 or 1920x1080)")]
    UnknownResolution(String),

    /// Endpoint address is empty.
    #[error("endpoint address must not be empty")]
    EmptyEndpoint,
}

/// Requested capture dimensions.
///
/// This is a hint to the device; the actual feed may differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// 640x480.
    #[serde(rename = "640x480")]
    Vga,

    /// 1280x720.
    #[default]
    #[serde(rename = "1280x720")]
    Hd,

    /// 1920x1080.
    #[serde(rename = "1920x1080")]
    FullHd,
}

impl Resolution {
    /// Every supported resolution, smallest first.
    pub const ALL: [Resolution; 3] = [Self::Vga, Self::Hd, Self::FullHd];

    /// Width in pixels.
    pub fn width(self) -> u32 {
        match self {
            Self::Vga => 640,
            Self::Hd => 1280,
            Self::FullHd => 1920,
        }
    }

    /// Height in pixels.
    pub fn height(self) -> u32 {
        match self {
            Self::Vga => 480,
            Self::Hd => 720,
            Self::FullHd => 1080,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.to_string() == s)
            .ok_or_else(|| ValidationError::UnknownResolution(s.to_string()))
    }
}

/// Capture and transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Target frames per second (1-30).
    pub rate: u32,

    /// JPEG quality factor in (0, 1].
    pub quality: f32,

    /// Requested capture resolution.
    pub resolution: Resolution,

    /// Endpoint address for the outbound connection.
    pub endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate: 10,
            quality: 0.8,
            resolution: Resolution::Hd,
            endpoint: "ws://localhost:8000/stream".to_string(),
        }
    }
}

impl Settings {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(MIN_RATE..=MAX_RATE).contains(&self.rate) {
            return Err(ValidationError::RateOutOfRange(self.rate));
        }

        // NaN fails both comparisons and is rejected here.
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(ValidationError::QualityOutOfRange(self.quality));
        }

        if self.endpoint.trim().is_empty() {
            return Err(ValidationError::EmptyEndpoint);
        }

        Ok(())
    }

    /// Time between two ticks at the configured rate.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.rate.max(MIN_RATE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(rate: u32, quality: f32) -> Settings {
        Settings {
            rate,
            quality,
            ..Settings::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.resolution, Resolution::Hd);
        assert_eq!(settings.rate, 10);
    }

    #[test]
    fn test_rate_bounds() {
        assert_eq!(with(0, 0.8).validate(), Err(ValidationError::RateOutOfRange(0)));
        assert_eq!(with(31, 0.8).validate(), Err(ValidationError::RateOutOfRange(31)));
        assert!(with(1, 0.8).validate().is_ok());
        assert!(with(30, 0.8).validate().is_ok());
    }

    #[test]
    fn test_quality_bounds() {
        assert!(matches!(
            with(10, 0.0).validate(),
            Err(ValidationError::QualityOutOfRange(_))
        ));
        assert!(matches!(
            with(10, 1.5).validate(),
            Err(ValidationError::QualityOutOfRange(_))
        ));
        assert!(matches!(
            with(10, f32::NAN).validate(),
            Err(ValidationError::QualityOutOfRange(_))
        ));
        assert!(with(10, 0.1).validate().is_ok());
        assert!(with(10, 1.0).validate().is_ok());
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let settings = Settings {
            endpoint: "   ".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.validate(), Err(ValidationError::EmptyEndpoint));
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!("1280x720".parse::<Resolution>(), Ok(Resolution::Hd));
        assert_eq!("640x480".parse::<Resolution>(), Ok(Resolution::Vga));
        assert_eq!(" 1920x1080 ".parse::<Resolution>(), Ok(Resolution::FullHd));
        assert_eq!(
            "800x600".parse::<Resolution>(),
            Err(ValidationError::UnknownResolution("800x600".to_string()))
        );
    }

    #[test]
    fn test_resolution_serde_uses_dimensions() {
        let json = serde_json::to_string(&Resolution::Hd).unwrap();
        assert_eq!(json, "\"1280x720\"");
        let back: Resolution = serde_json::from_str("\"640x480\"").unwrap();
        assert_eq!(back, Resolution::Vga);
    }

    #[test]
    fn test_tick_interval() {
        assert_eq!(with(10, 0.8).tick_interval(), Duration::from_millis(100));
        assert_eq!(with(1, 0.8).tick_interval(), Duration::from_secs(1));
        assert_eq!(with(30, 0.8).tick_interval(), Duration::from_nanos(33_333_333));
    }
}
