//! Static configuration for the coordinator.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. `coordinator.toml` in the working directory, or the file given with `--config`
//! 3. `EPS__SECTION__KEY` environment variables (a `.env` file is loaded first)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use eps_spine_client::{LiveClientConfig, RoutingTable};

pub const DEFAULT_CONFIG_FILE: &str = "coordinator.toml";
pub const ENV_PREFIX: &str = "EPS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spine: SpineConfig,
    pub polling: PollingConfig,
    pub signature: SignatureConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpineConfig {
    pub base_url: String,
    pub prescription_path: String,
    /// ebXML party key of this system.
    pub from_party_key: String,
    /// ebXML party key of Spine.
    pub to_party_key: String,
    pub from_asid: String,
    pub to_asid: String,
    /// JSON `[[interactionId, cpaId], ...]` or `{ interactionId: cpaId }`.
    pub cpa_id_map: String,
    pub timeout_secs: u64,
    /// Answer from canned responses instead of calling Spine.
    pub sandbox: bool,
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            prescription_path: "Prescription".to_string(),
            from_party_key: String::new(),
            to_party_key: "YES-0000806".to_string(),
            from_asid: String::new(),
            to_asid: "990101234567".to_string(),
            cpa_id_map: String::new(),
            timeout_secs: 30,
            sandbox: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
    /// Overall budget from the first send, in seconds.
    pub deadline_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: 30,
            deadline_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// PEM certificates of accepted signing CAs. Empty disables the trust check.
    pub trusted_issuers: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub file_enabled: bool,
    pub file_directory: String,
    pub file_prefix: String,
    /// `daily`, `hourly`, `minutely` or `never`.
    pub file_rotation: String,
    pub service_name: String,
    pub deployment_environment: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_enabled: false,
            file_directory: "logs".to_string(),
            file_prefix: "eps-coordinator".to_string(),
            file_rotation: "daily".to_string(),
            service_name: "eps-coordinator".to_string(),
            deployment_environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Loads defaults, the config file and the environment. An explicit
    /// `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("signature.trusted_issuers")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url()?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "spine.base_url must be http or https, got '{}'",
                base_url.scheme()
            )));
        }
        if self.spine.from_party_key.trim().is_empty() {
            return Err(invalid("spine.from_party_key is required"));
        }
        if self.spine.to_party_key.trim().is_empty() {
            return Err(invalid("spine.to_party_key is required"));
        }
        if self.spine.from_asid.trim().is_empty() {
            return Err(invalid("spine.from_asid is required"));
        }
        if self.spine.timeout_secs == 0 {
            return Err(invalid("spine.timeout_secs must be greater than 0"));
        }
        if self.polling.interval_ms == 0 {
            return Err(invalid("polling.interval_ms must be greater than 0"));
        }
        if self.polling.max_attempts == 0 {
            return Err(invalid("polling.max_attempts must be greater than 0"));
        }
        if !matches!(
            self.logging.file_rotation.as_str(),
            "daily" | "hourly" | "minutely" | "never"
        ) {
            return Err(invalid(format!(
                "logging.file_rotation must be daily, hourly, minutely or never, got '{}'",
                self.logging.file_rotation
            )));
        }
        self.routing_table()?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        // Without a trailing slash `join` would replace the last path segment.
        let mut raw = self.spine.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| invalid(format!("spine.base_url '{}': {e}", self.spine.base_url)))
    }

    pub fn routing_table(&self) -> Result<RoutingTable> {
        if self.spine.cpa_id_map.trim().is_empty() {
            return Err(invalid("spine.cpa_id_map is required"));
        }
        RoutingTable::from_json(&self.spine.cpa_id_map).map_err(|e| invalid(format!("spine.cpa_id_map: {e}")))
    }

    pub fn live_client(&self) -> Result<LiveClientConfig> {
        let mut live = LiveClientConfig::new(self.base_url()?, self.spine.from_asid.clone());
        live.prescription_path = self.spine.prescription_path.clone();
        live.timeout = Duration::from_secs(self.spine.timeout_secs);
        Ok(live)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.spine.from_party_key = "T141D-822234".to_string();
        config.spine.from_asid = "200000001285".to_string();
        config.spine.cpa_id_map = r#"[["PORX_IN020101SM31","S20000A000086"]]"#.to_string();
        config
    }

    #[test]
    fn defaults_need_identity_and_routing() {
        assert!(matches!(Config::default().validate(), Err(Error::InvalidConfig(_))));
        valid().validate().unwrap();
    }

    #[test]
    fn malformed_cpa_map_is_rejected() {
        let mut config = valid();
        config.spine.cpa_id_map = "{not json".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spine.cpa_id_map"), "{err}");

        config.spine.cpa_id_map = "[]".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let mut config = valid();
        config.spine.base_url = "https://spine.example.nhs.uk/reliable".to_string();
        let live = config.live_client().unwrap();
        assert_eq!(
            live.base_url.join("Prescription").unwrap().as_str(),
            "https://spine.example.nhs.uk/reliable/Prescription"
        );
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let mut config = valid();
        config.spine.base_url = "ftp://spine.example.nhs.uk/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_rotation_is_rejected() {
        let mut config = valid();
        config.logging.file_rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_polling_attempts_is_rejected() {
        let mut config = valid();
        config.polling.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
