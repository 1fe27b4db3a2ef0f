//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LDAPD_CONFIG or --config)
//! 3. Environment variables

use ldapd_schema::{Schema, SchemaDefinitions, SchemaError};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// TLS configuration.
    pub tls: TlsConfig,
    /// Server-side limits.
    pub limits: LimitsConfig,
    /// Optional protocol features.
    pub features: FeaturesConfig,
    /// Contents of the built-in directory.
    pub directory: DirectoryConfig,
    /// Schema extensions.
    pub schema: SchemaConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::ParseError(_, msg) => ConfigError::ParseError(path.to_path_buf(), msg),
            other => other,
        })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(PathBuf::from("<inline>"), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.tls.apply_env_overrides();
        self.limits.apply_env_overrides();
        self.features.apply_env_overrides();
        self.directory.apply_env_overrides();
        self.metrics.apply_env_overrides();
    }

    /// Loads password hashes from the directory secrets file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        self.directory.load_secrets()
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tls.validate()?;
        ldapd_schema::Dn::parse(&self.directory.base_dn).map_err(|e| {
            ConfigError::ValidationError(format!("invalid directory.base_dn: {}", e))
        })?;
        let mut seen = std::collections::HashSet::new();
        for user in &self.directory.users {
            if !seen.insert(user.uid.to_lowercase()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate user uid '{}'",
                    user.uid
                )));
            }
        }
        Ok(())
    }

    /// Builds the standard schema extended with the configured descriptions.
    pub fn build_schema(&self) -> Result<Schema, SchemaError> {
        let schema = Schema::standard()?;
        if self.schema.attribute_types.is_empty() && self.schema.object_classes.is_empty() {
            return Ok(schema);
        }
        let extra =
            SchemaDefinitions::parse(&self.schema.attribute_types, &self.schema.object_classes)?;
        schema.extend(&extra)
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, ldapd_protocol::DEFAULT_PORT)),
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(addr) = env_parse("LDAPD_BIND") {
            self.bind_addr = addr;
        }
        if let Some(secs) = env_parse("LDAPD_IDLE_TIMEOUT") {
            self.idle_timeout_secs = secs;
        }
        if let Some(n) = env_parse("LDAPD_MAX_CONNECTIONS") {
            self.max_connections = n;
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// TLS configuration.
///
/// With `implicit` set every connection starts with a TLS handshake (LDAPS);
/// otherwise the certificate is offered through the StartTLS operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS.
    pub enabled: bool,
    /// Handshake on accept instead of on StartTLS.
    pub implicit: bool,
    /// Path to PEM-encoded server certificate file.
    pub cert_path: Option<PathBuf>,
    /// Path to PEM-encoded private key file.
    pub key_path: Option<PathBuf>,
    /// Require client certificate authentication (mTLS).
    pub require_client_cert: bool,
    /// Path to PEM-encoded CA certificate(s) for verifying client certs.
    /// Required if require_client_cert is true.
    pub client_ca_path: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_flag("LDAPD_TLS_ENABLED") {
            self.enabled = enabled;
        }
        if let Some(implicit) = env_flag("LDAPD_TLS_IMPLICIT") {
            self.implicit = implicit;
        }
        if let Ok(path) = std::env::var("LDAPD_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("LDAPD_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
        if let Some(require) = env_flag("LDAPD_TLS_REQUIRE_CLIENT_CERT") {
            self.require_client_cert = require;
        }
        if let Ok(path) = std::env::var("LDAPD_TLS_CLIENT_CA") {
            self.client_ca_path = Some(PathBuf::from(path));
        }
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.cert_path.is_none() {
            return Err(ConfigError::ValidationError(
                "TLS enabled but cert_path not set".to_string(),
            ));
        }
        if self.key_path.is_none() {
            return Err(ConfigError::ValidationError(
                "TLS enabled but key_path not set".to_string(),
            ));
        }
        if self.require_client_cert && self.client_ca_path.is_none() {
            return Err(ConfigError::ValidationError(
                "mTLS enabled but client_ca_path not set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server-side limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum entries returned by one search (0 = unlimited).
    pub size_limit: u32,
    /// Maximum open paged-results cursors per connection.
    pub max_paged_cursors: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            size_limit: 1000,
            max_paged_cursors: 16,
        }
    }
}

impl LimitsConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_parse("LDAPD_SIZE_LIMIT") {
            self.size_limit = n;
        }
        if let Some(n) = env_parse("LDAPD_MAX_PAGED_CURSORS") {
            self.max_paged_cursors = n;
        }
    }
}

/// Optional protocol features.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// "Who am I?" extended operation.
    pub whoami: bool,
    /// Password Modify extended operation.
    pub password_modify: bool,
    /// Simple paged results control.
    pub paged_results: bool,
    /// Accept anonymous simple and SASL binds.
    pub allow_anonymous: bool,
    /// SASL mechanisms offered, in preference order.
    pub sasl_mechanisms: Vec<String>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            whoami: true,
            password_modify: true,
            paged_results: true,
            allow_anonymous: true,
            sasl_mechanisms: vec![
                "ANONYMOUS".to_string(),
                "PLAIN".to_string(),
                "EXTERNAL".to_string(),
            ],
        }
    }
}

impl FeaturesConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(allow) = env_flag("LDAPD_ALLOW_ANONYMOUS") {
            self.allow_anonymous = allow;
        }
        if let Ok(list) = std::env::var("LDAPD_SASL_MECHANISMS") {
            self.sasl_mechanisms = list
                .split(',')
                .map(|m| m.trim().to_uppercase())
                .filter(|m| !m.is_empty())
                .collect();
        }
    }
}

/// A posixAccount served by the built-in directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub uid: String,
    /// Full name; defaults to the uid.
    pub cn: Option<String>,
    pub uid_number: i64,
    pub gid_number: i64,
    /// Defaults to `/home/<uid>`.
    pub home_directory: Option<String>,
    pub login_shell: Option<String>,
    pub mail: Option<String>,
    /// SHA-256 hex hash of the password.
    /// Generate hashes with: `ldapd hash-password <password>`
    pub password_hash: Option<String>,
}

/// A posixGroup served by the built-in directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub cn: String,
    pub gid_number: i64,
    /// Member uids.
    pub members: Vec<String>,
}

/// Contents of the built-in directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Naming context served.
    pub base_dn: String,
    /// Organization name put on the base entry.
    pub organization: String,
    pub users: Vec<UserConfig>,
    pub groups: Vec<GroupConfig>,
    /// Optional path to a secrets file of `uid:hash` lines.
    pub secrets_file: Option<PathBuf>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_dn: "dc=example,dc=com".to_string(),
            organization: "Example".to_string(),
            users: Vec::new(),
            groups: Vec::new(),
            secrets_file: None,
        }
    }
}

impl DirectoryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(base) = std::env::var("LDAPD_BASE_DN") {
            self.base_dn = base;
        }
        if let Ok(path) = std::env::var("LDAPD_SECRETS_FILE") {
            self.secrets_file = Some(PathBuf::from(path));
        }
    }

    /// Loads password hashes from the secrets file if configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        let Some(ref path) = self.secrets_file else {
            return Ok(());
        };
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.clone(), e))?;
        for line in content.lines() {
            let line = line.trim();
            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((uid, hash)) = line.split_once(':') else {
                return Err(ConfigError::ParseError(
                    path.clone(),
                    format!("expected 'uid:hash', got '{}'", line),
                ));
            };
            let user = self
                .users
                .iter_mut()
                .find(|u| u.uid.eq_ignore_ascii_case(uid.trim()))
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "secrets file names unknown user '{}'",
                        uid.trim()
                    ))
                })?;
            user.password_hash = Some(hash.trim().to_lowercase());
        }
        Ok(())
    }
}

/// Extra schema descriptions in RFC4512 form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub attribute_types: Vec<String>,
    pub object_classes: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics HTTP server.
    pub enabled: bool,
    /// Address to bind the metrics server to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
        }
    }
}

impl MetricsConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_flag("LDAPD_METRICS_ENABLED") {
            self.enabled = enabled;
        }
        if let Some(addr) = env_parse("LDAPD_METRICS_BIND") {
            self.bind_addr = addr;
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// SocketAddr as a string in YAML.
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
network:
  bind_addr: "127.0.0.1:10389"
limits:
  size_limit: 50
features:
  allow_anonymous: false
  sasl_mechanisms: [PLAIN]
directory:
  base_dn: "dc=corp,dc=test"
  users:
    - uid: alice
      cn: Alice Liddell
      uid_number: 1000
      gid_number: 100
schema:
  attribute_types:
    - "( 1.3.6.1.4.1.99999.1.1 NAME 'badgeNumber' EQUALITY integerMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.27 SINGLE-VALUE )"
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), 389);
        assert_eq!(config.limits.size_limit, 1000);
        assert!(config.features.allow_anonymous);
        assert!(!config.tls.implicit);
        assert_eq!(config.directory.base_dn, "dc=example,dc=com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.network.bind_addr.port(), 10389);
        assert_eq!(config.limits.size_limit, 50);
        // Unset fields keep their defaults
        assert_eq!(config.limits.max_paged_cursors, 16);
        assert!(!config.features.allow_anonymous);
        assert_eq!(config.features.sasl_mechanisms, vec!["PLAIN"]);
        assert_eq!(config.directory.users[0].cn.as_deref(), Some("Alice Liddell"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.network.bind_addr, config.network.bind_addr);
        assert_eq!(parsed.directory.users.len(), 1);
    }

    #[test]
    fn test_build_schema_with_extensions() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let schema = config.build_schema().unwrap();
        let at = schema.attribute_type("badgeNumber").unwrap();
        assert!(at.single_value);
        assert!(schema.attribute_type("uidNumber").is_some());

        let mut broken = config.clone();
        broken.schema.attribute_types = vec!["( 1.2.3 NAME 'x' SYNTAX 9.9.9 )".to_string()];
        assert!(broken.build_schema().is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.directory.base_dn = "not a dn".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.directory.users = vec![
            UserConfig {
                uid: "bob".into(),
                ..Default::default()
            },
            UserConfig {
                uid: "BOB".into(),
                ..Default::default()
            },
        ];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tls.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.directory.base_dn, "dc=corp,dc=test");

        let err = Config::from_file("/nonexistent/ldapd.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_secrets_file() {
        let mut secrets = NamedTempFile::new().unwrap();
        writeln!(secrets, "# uid:sha256").unwrap();
        writeln!(secrets).unwrap();
        writeln!(secrets, "alice:ABCDEF").unwrap();

        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.directory.secrets_file = Some(secrets.path().to_path_buf());
        config.load_secrets().unwrap();
        assert_eq!(
            config.directory.users[0].password_hash.as_deref(),
            Some("abcdef")
        );

        writeln!(secrets, "mallory:00").unwrap();
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.directory.secrets_file = Some(secrets.path().to_path_buf());
        assert!(config.load_secrets().is_err());
    }
}
