use serde::{Deserialize, Serialize};

use crate::scan::constants::{SCAN_PERIOD_SECS, TARGET_DEVICE_NAME};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Advertised device name that discovery filters on.
    pub device_name: String,

    /// How long a scan session runs before it is stopped automatically.
    pub scan_period_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: TARGET_DEVICE_NAME.to_string(),
            scan_period_secs: SCAN_PERIOD_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_original_app() {
        let config = Config::default();
        assert_eq!(config.device_name, "fastrec");
        assert_eq!(config.scan_period_secs, 10);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());

        let config: Config = serde_json::from_str(r#"{"deviceName": "other"}"#).unwrap();
        assert_eq!(config.device_name, "other");
        assert_eq!(config.scan_period_secs, 10);
    }
}
