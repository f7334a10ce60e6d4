//! Daemon configuration
//!
//! ```kdl
//! server {
//!     host "0.0.0.0"
//!     port 8080
//! }
//! database {
//!     path "/var/lib/acctbroker/instances.json"
//! }
//! broker {
//!     base-email "ops@example.com"
//!     submit-timeout 30
//! }
//! ```

use crate::error::{ConfigError, Result};
use acctbroker_core::{DEFAULT_SUBMIT_TIMEOUT, validate_base};
use kdl::{KdlDocument, KdlNode};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "broker.kdl";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_FILE: &str = "instances.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    /// Correlation state file
    pub database_path: PathBuf,
    pub base_email: Option<String>,
    pub submit_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            base_email: None,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|e| e.value().as_integer())
}

fn required_string(section: &str, node: &KdlNode) -> Result<String> {
    first_string(node).map(|s| s.to_string()).ok_or_else(|| {
        ConfigError::InvalidConfig(format!(
            "{}.{} requires a string value",
            section,
            node.name().value()
        ))
    })
}

impl BrokerConfig {
    /// Parse a KDL config document. Unknown nodes are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: KdlDocument = content.parse()?;
        let mut config = Self::default();

        for node in doc.nodes() {
            let Some(children) = node.children() else {
                continue;
            };

            match node.name().value() {
                "server" => {
                    for child in children.nodes() {
                        match child.name().value() {
                            "host" => config.server.host = required_string("server", child)?,
                            "port" => {
                                config.server.port = first_integer(child)
                                    .and_then(|p| u16::try_from(p).ok())
                                    .ok_or_else(|| {
                                        ConfigError::InvalidConfig(
                                            "server.port must be an integer between 0 and 65535"
                                                .to_string(),
                                        )
                                    })?;
                            }
                            _ => {}
                        }
                    }
                }
                "database" => {
                    for child in children.nodes() {
                        if child.name().value() == "path" {
                            config.database_path =
                                PathBuf::from(required_string("database", child)?);
                        }
                    }
                }
                "broker" => {
                    for child in children.nodes() {
                        match child.name().value() {
                            "base-email" => {
                                config.base_email = Some(required_string("broker", child)?);
                            }
                            "submit-timeout" => {
                                let secs = first_integer(child)
                                    .and_then(|s| u64::try_from(s).ok())
                                    .filter(|s| *s > 0)
                                    .ok_or_else(|| {
                                        ConfigError::InvalidConfig(
                                            "broker.submit-timeout must be a positive number of seconds"
                                                .to_string(),
                                        )
                                    })?;
                                config.submit_timeout = Duration::from_secs(secs);
                            }
                            _ => {}
                        }
                    }
                }
                other => {
                    tracing::debug!("Ignoring unknown config node: {}", other);
                }
            }
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise the first of
    /// `./broker.kdl` and `<config dir>/acctbroker/broker.kdl` is used, and
    /// defaults apply when neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            tracing::debug!("Loading config from {}", path.display());
            return Self::from_file(path);
        }

        match find_config_file() {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Apply `BASE_EMAIL` and `DATABASE_URL` overrides
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(email) = lookup("BASE_EMAIL") {
            self.base_email = Some(email);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_path = database_path_from_url(&url)?;
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// The validated base email
    pub fn base_email(&self) -> Result<&str> {
        let email = self
            .base_email
            .as_deref()
            .ok_or(ConfigError::MissingBaseEmail)?;

        validate_base(email).map_err(|e| ConfigError::InvalidBaseEmail {
            email: email.to_string(),
            reason: e.to_string(),
        })?;

        Ok(email)
    }

    /// `host:port` to listen on
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Search the working directory, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let global = dirs::config_dir()?
        .join("acctbroker")
        .join(DEFAULT_CONFIG_FILE);
    global.exists().then_some(global)
}

/// Resolve a `DATABASE_URL` to a state file path.
///
/// Accepts `file:` URLs (with or without `//`) and plain paths; query
/// strings are dropped.
pub fn database_path_from_url(url: &str) -> Result<PathBuf> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConfigError::UnsupportedDatabase(url.to_string()));
    }

    if let Some(rest) = url.strip_prefix("file:") {
        let rest = rest.split('?').next().unwrap_or_default();
        let rest = match rest.strip_prefix("//") {
            Some(authority_and_path) => authority_and_path
                .strip_prefix("localhost")
                .unwrap_or(authority_and_path),
            None => rest,
        };
        if rest.is_empty() {
            return Err(ConfigError::UnsupportedDatabase(url.to_string()));
        }
        return Ok(PathBuf::from(rest));
    }

    if let Some((scheme, _)) = url.split_once(':') {
        let looks_like_scheme = scheme.len() > 1
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if looks_like_scheme {
            return Err(ConfigError::UnsupportedDatabase(url.to_string()));
        }
    }

    Ok(PathBuf::from(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let config = BrokerConfig::parse(
            r#"
server {
    host "127.0.0.1"
    port 9090
}
database {
    path "/var/lib/acctbroker/instances.json"
}
broker {
    base-email "ops@example.com"
    submit-timeout 10
}
"#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/acctbroker/instances.json")
        );
        assert_eq!(config.base_email.as_deref(), Some("ops@example.com"));
        assert_eq!(config.submit_timeout, Duration::from_secs(10));
        assert_eq!(config.bind_address(), "127.0.0.1:9090");
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = BrokerConfig::parse("").unwrap();
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_parse_ignores_unknown_nodes() {
        let config = BrokerConfig::parse(
            r#"
metrics { enabled #true }
server { port 8181; tls "off" }
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8181);
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        let err = BrokerConfig::parse("server { port 70000 }").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_rejects_zero_timeout() {
        let err = BrokerConfig::parse("broker { submit-timeout 0 }").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_invalid_kdl() {
        let err = BrokerConfig::parse("server { host ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BrokerConfig::parse(
            r#"broker { base-email "file@example.com"; }
database { path "from-file.json"; }"#,
        )
        .unwrap();

        config
            .apply_env(lookup(&[
                ("BASE_EMAIL", "env@example.com"),
                ("DATABASE_URL", "file:///tmp/acctbroker.json"),
            ]))
            .unwrap();

        assert_eq!(config.base_email.as_deref(), Some("env@example.com"));
        assert_eq!(config.database_path, PathBuf::from("/tmp/acctbroker.json"));
    }

    #[test]
    fn test_env_without_overrides_keeps_file_values() {
        let mut config = BrokerConfig::parse(r#"broker { base-email "file@example.com"; }"#).unwrap();
        config.apply_env(lookup(&[])).unwrap();
        assert_eq!(config.base_email.as_deref(), Some("file@example.com"));
    }

    #[test]
    fn test_apply_process_env() {
        temp_env::with_vars(
            [
                ("BASE_EMAIL", Some("process@example.com")),
                ("DATABASE_URL", None::<&str>),
            ],
            || {
                let mut config = BrokerConfig::default();
                config.apply_process_env().unwrap();
                assert_eq!(config.base_email.as_deref(), Some("process@example.com"));
                assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_FILE));
            },
        );
    }

    #[test]
    fn test_base_email_required() {
        let config = BrokerConfig::default();
        assert!(matches!(
            config.base_email(),
            Err(ConfigError::MissingBaseEmail)
        ));
    }

    #[test]
    fn test_base_email_validated() {
        let config = BrokerConfig {
            base_email: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.base_email(),
            Err(ConfigError::InvalidBaseEmail { .. })
        ));

        let config = BrokerConfig {
            base_email: Some("foo@bar.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_email().unwrap(), "foo@bar.com");
    }

    #[test]
    fn test_database_url_forms() {
        assert_eq!(
            database_path_from_url("file:state.json").unwrap(),
            PathBuf::from("state.json")
        );
        assert_eq!(
            database_path_from_url("file:///var/lib/state.json").unwrap(),
            PathBuf::from("/var/lib/state.json")
        );
        assert_eq!(
            database_path_from_url("file://localhost/var/lib/state.json").unwrap(),
            PathBuf::from("/var/lib/state.json")
        );
        assert_eq!(
            database_path_from_url("file:state.json?mode=rwc").unwrap(),
            PathBuf::from("state.json")
        );
        assert_eq!(
            database_path_from_url("/srv/instances.json").unwrap(),
            PathBuf::from("/srv/instances.json")
        );
    }

    #[test]
    fn test_database_url_rejects_other_schemes() {
        for url in ["postgres://user@db/broker", "sqlite3:broker.db", "", "file:"] {
            assert!(
                matches!(
                    database_path_from_url(url),
                    Err(ConfigError::UnsupportedDatabase(_))
                ),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.kdl");
        let err = BrokerConfig::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.kdl");
        std::fs::write(&path, r#"broker { base-email "ops@example.com"; }"#).unwrap();

        let config = BrokerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_email.as_deref(), Some("ops@example.com"));
    }
}
