//! Validated settings storage.

use tracing::{debug, warn};

use camstream_ipc::{Settings, ValidationError};

/// Holds the operator's current settings.
///
/// Values are read when capture or streaming starts; replacing them while
/// either is running takes effect on the next start.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    current: Settings,
}

impl SettingsStore {
    /// Create a store, validating the initial value.
    pub fn new(initial: Settings) -> Result<Self, ValidationError> {
        initial.validate()?;
        Ok(Self { current: initial })
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    /// Replace the settings wholesale. Invalid values leave the store as is.
    pub fn replace(&mut self, settings: Settings) -> Result<(), ValidationError> {
        if let Err(e) = settings.validate() {
            warn!("Rejected settings: {}", e);
            return Err(e);
        }

        debug!(
            rate = settings.rate,
            quality = settings.quality,
            resolution = %settings.resolution,
            endpoint = %settings.endpoint,
            "Settings updated"
        );
        self.current = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camstream_ipc::Resolution;

    fn with(rate: u32, quality: f32) -> Settings {
        Settings {
            rate,
            quality,
            ..Settings::default()
        }
    }

    #[test]
    fn test_boundaries() {
        let mut store = SettingsStore::default();

        for (rate, quality) in [(1, 0.8), (30, 0.8), (10, 0.1), (10, 1.0)] {
            assert!(store.replace(with(rate, quality)).is_ok(), "{rate} {quality}");
        }

        assert_eq!(
            store.replace(with(0, 0.8)),
            Err(ValidationError::RateOutOfRange(0))
        );
        assert_eq!(
            store.replace(with(31, 0.8)),
            Err(ValidationError::RateOutOfRange(31))
        );
        assert_eq!(
            store.replace(with(10, 0.0)),
            Err(ValidationError::QualityOutOfRange(0.0))
        );
        assert_eq!(
            store.replace(with(10, 1.5)),
            Err(ValidationError::QualityOutOfRange(1.5))
        );
    }

    #[test]
    fn test_rejected_value_keeps_previous() {
        let mut store = SettingsStore::default();
        store
            .replace(Settings {
                resolution: Resolution::FullHd,
                ..with(5, 0.5)
            })
            .unwrap();

        assert!(store.replace(with(99, 0.5)).is_err());
        assert_eq!(store.get().rate, 5);
        assert_eq!(store.get().resolution, Resolution::FullHd);
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let mut store = SettingsStore::default();
        let settings = Settings {
            endpoint: "   ".to_string(),
            ..Settings::default()
        };
        assert_eq!(store.replace(settings), Err(ValidationError::EmptyEndpoint));
    }

    #[test]
    fn test_new_validates() {
        assert!(SettingsStore::new(Settings::default()).is_ok());
        assert!(SettingsStore::new(with(0, 0.5)).is_err());
    }
}
