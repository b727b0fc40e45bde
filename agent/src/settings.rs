use regguard_policy::FilterConfig;

/// Altitude used when the configuration does not name one.
pub const DEFAULT_ALTITUDE: &str = "385200";

/// Startup parameters for [`RegistryFilter`](crate::RegistryFilter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSettings {
    /// Callback altitude advertised when installing the hook.
    pub altitude: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            altitude: DEFAULT_ALTITUDE.to_string(),
        }
    }
}

impl FilterSettings {
    pub fn with_altitude(altitude: impl Into<String>) -> Self {
        Self {
            altitude: altitude.into(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        match &config.altitude {
            Some(altitude) => Self::with_altitude(altitude.clone()),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_altitude_overrides_default() {
        let config = FilterConfig::from_yaml("version: 1\naltitude: \"320000\"\n").unwrap();
        assert_eq!(FilterSettings::from_config(&config).altitude, "320000");

        let config = FilterConfig::from_yaml("version: 1\n").unwrap();
        assert_eq!(FilterSettings::from_config(&config), FilterSettings::default());
    }
}
