use serde::{Deserialize, Serialize};
use std::path::Path;

use attesta_core::AttributeId;

use crate::error::{ServerError, ServerResult};

/// The set of attributes the server recognizes. Requests referencing
/// anything outside this list are rejected outright.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemeConfig {
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// A party allowed to open sessions, identified by the key id in its
/// request envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestorConfig {
    /// Key id the requestor puts in its envelope header.
    pub name: String,

    /// Ed25519 verifying key, hex-encoded (32 bytes).
    pub key: String,

    /// Attribute patterns this requestor may ask for. A pattern is either a
    /// full attribute id, a prefix ending in `.*`, or `*` for everything.
    #[serde(default)]
    pub authorized: Vec<String>,
}

/// An attesting issuer whose key signs the proof material clients submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestorConfig {
    /// Key id referenced from submitted proof material.
    pub key_id: String,

    /// Ed25519 verifying key, hex-encoded (32 bytes).
    pub key: String,
}

/// Top-level configuration for the attesta server, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port for the HTTP listener.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Result validity applied when a request leaves it unset.
    #[serde(default = "default_validity")]
    pub default_validity_secs: u64,

    /// Session timeout applied when a request leaves it unset.
    #[serde(default = "default_session_timeout")]
    pub default_session_timeout_secs: u64,

    /// Upper bound on a single status long-poll.
    #[serde(default = "default_poll_wait")]
    pub max_poll_wait_secs: u64,

    /// Maximum age of a signed request envelope before it is rejected.
    #[serde(default = "default_request_age")]
    pub max_request_age_secs: u64,

    /// Interval of the background expired-session sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub scheme: SchemeConfig,

    #[serde(default)]
    pub requestors: Vec<RequestorConfig>,

    #[serde(default)]
    pub attestors: Vec<AttestorConfig>,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_validity() -> u64 {
    3600
}

fn default_session_timeout() -> u64 {
    600
}

fn default_poll_wait() -> u64 {
    30
}

fn default_request_age() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            default_validity_secs: default_validity(),
            default_session_timeout_secs: default_session_timeout(),
            max_poll_wait_secs: default_poll_wait(),
            max_request_age_secs: default_request_age(),
            sweep_interval_secs: default_sweep_interval(),
            scheme: SchemeConfig::default(),
            requestors: Vec::new(),
            attestors: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> ServerResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(ServerError::Io)?;
        let config: ServerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ServerResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ServerError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ServerError::Io)?;
        }
        std::fs::write(path, contents).map_err(ServerError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ServerResult<()> {
        if self.default_validity_secs == 0 {
            return Err(ServerError::Config(
                "default_validity_secs must be > 0".into(),
            ));
        }
        if self.default_session_timeout_secs == 0 {
            return Err(ServerError::Config(
                "default_session_timeout_secs must be > 0".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ServerError::Config("sweep_interval_secs must be > 0".into()));
        }
        for attribute in &self.scheme.attributes {
            if AttributeId::parse(attribute).is_none() {
                return Err(ServerError::Config(format!(
                    "invalid scheme attribute '{}'",
                    attribute
                )));
            }
        }
        for requestor in &self.requestors {
            decode_key(&requestor.key).map_err(|e| {
                ServerError::Config(format!("requestor '{}': {}", requestor.name, e))
            })?;
            for pattern in &requestor.authorized {
                if !valid_pattern(pattern) {
                    return Err(ServerError::Config(format!(
                        "requestor '{}': invalid pattern '{}'",
                        requestor.name, pattern
                    )));
                }
            }
        }
        for attestor in &self.attestors {
            decode_key(&attestor.key).map_err(|e| {
                ServerError::Config(format!("attestor '{}': {}", attestor.key_id, e))
            })?;
        }
        Ok(())
    }
}

/// Decode a hex-encoded Ed25519 verifying key.
pub fn decode_key(hex_key: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex_key).map_err(|e| format!("invalid hex key: {}", e))?;
    bytes
        .try_into()
        .map_err(|_| "key must be exactly 32 bytes".to_string())
}

/// Whether a policy pattern is well-formed: `*`, a prefix ending in `.*`,
/// or a literal attribute id.
fn valid_pattern(pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return !prefix.is_empty() && !prefix.contains('*');
    }
    AttributeId::parse(pattern).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "127.0.0.1");
        assert_eq!(config.port, 8088);
        assert_eq!(config.default_validity_secs, 3600);
        assert_eq!(config.default_session_timeout_secs, 600);
        assert_eq!(config.max_poll_wait_secs, 30);
        assert_eq!(config.max_request_age_secs, 300);
        assert!(config.requestors.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = format!(
            r#"
bind = "0.0.0.0"
port = 9090
default_session_timeout_secs = 120

[scheme]
attributes = ["demo.acme.id.name", "demo.acme.id.over18"]

[[requestors]]
name = "webshop"
key = "{KEY}"
authorized = ["demo.acme.*"]

[[attestors]]
key_id = "demo.acme"
key = "{KEY}"
"#
        );
        let config: ServerConfig = toml::from_str(&toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.default_session_timeout_secs, 120);
        assert_eq!(config.scheme.attributes.len(), 2);
        assert_eq!(config.requestors[0].name, "webshop");
        assert_eq!(config.attestors[0].key_id, "demo.acme");
    }

    #[test]
    fn test_config_validate_ok() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_validate_zero_timeout() {
        let mut config = ServerConfig::default();
        config.default_session_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_bad_attribute() {
        let mut config = ServerConfig::default();
        config.scheme.attributes.push("not-dotted".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_bad_key() {
        let mut config = ServerConfig::default();
        config.requestors.push(RequestorConfig {
            name: "sp".into(),
            key: "deadbeef".into(),
            authorized: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_bad_pattern() {
        let mut config = ServerConfig::default();
        config.requestors.push(RequestorConfig {
            name: "sp".into(),
            key: KEY.into(),
            authorized: vec!["demo.*.id".into()],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_patterns() {
        assert!(valid_pattern("*"));
        assert!(valid_pattern("demo.acme.*"));
        assert!(valid_pattern("demo.acme.id.name"));
        assert!(!valid_pattern("demo.*.id"));
        assert!(!valid_pattern(".*"));
        assert!(!valid_pattern("one.two"));
    }

    #[test]
    fn test_decode_key() {
        assert!(decode_key(KEY).is_ok());
        assert!(decode_key("zz").is_err());
        assert!(decode_key("deadbeef").is_err());
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = ServerConfig::load(Path::new("/nonexistent/attesta.toml")).unwrap();
        assert_eq!(config.port, 8088);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = std::env::temp_dir().join("attesta-test-config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("attesta.toml");

        let mut config = ServerConfig::default();
        config.port = 9999;
        config.scheme.attributes.push("demo.acme.id.name".into());

        config.save(&path).unwrap();
        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 9999);
        assert_eq!(loaded.scheme.attributes, vec!["demo.acme.id.name"]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
