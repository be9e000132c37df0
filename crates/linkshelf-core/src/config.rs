//! Configuration resolution for linkshelf.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/linkshelf/settings.json)
//! 3. Project config (.linkshelf/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! The token signing secret is not part of `Config`; it only comes from the
//! command line or `LINKSHELF_JWT_SECRET`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete linkshelf configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Which request carrier is consulted first for the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarrierPolicy {
    /// Session cookie first, `Authorization: Bearer` as fallback.
    #[default]
    CookieFirst,
    /// `Authorization: Bearer` first, session cookie as fallback.
    BearerFirst,
}

/// Session token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC algorithm name (`HS256`, `HS384` or `HS512`).
    pub algorithm: String,
    /// Access token lifetime (seconds). Default: 60 minutes.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime (seconds). Default: 7 days.
    pub refresh_ttl_secs: i64,
    pub carrier: CarrierPolicy,
    pub cookie_name: String,
    /// Production deployments only send the session cookie over HTTPS.
    pub production: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            access_ttl_secs: 60 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            carrier: CarrierPolicy::CookieFirst,
            cookie_name: "access_token".to_string(),
            production: false,
        }
    }
}

/// Who may grant access to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharePolicy {
    /// Only the link owner may share.
    #[default]
    OwnerOnly,
    /// The owner and any user holding a write grant may share.
    OwnerOrWriter,
}

/// Whose grants a user may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnsharePolicy {
    /// A user may only drop a grant they received.
    #[default]
    GranteeOnly,
    /// Additionally, the owner may remove anyone's grant on their link.
    OwnerOrGrantee,
}

/// Link sharing configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PermissionConfig {
    pub share_policy: SharePolicy,
    pub unshare_policy: UnsharePolicy,
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
    /// Upper bound for any single credential/revocation store call.
    pub store_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            store_timeout_ms: 2_000,
        }
    }
}

impl StorageConfig {
    pub const fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut layers = Vec::new();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            layers.push(load_config_file(&global_path)?);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".linkshelf").join("settings.json");
        if project_path.exists() {
            layers.push(load_config_file(&project_path)?);
        }
    }

    let mut config = resolve_layers(layers)?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;

    Ok(config)
}

/// Get the global config directory path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("linkshelf.db"))
}

/// `$XDG_CONFIG_HOME/linkshelf` on Linux, the platform equivalent elsewhere.
fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("linkshelf"))
}

/// Read one settings file as a raw JSON object.
///
/// Files are kept untyped until every layer is merged, so a key a file leaves
/// out never overrides the value from a lower layer.
fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    // Surface type errors against the file that caused them.
    serde_json::from_value::<Config>(value.clone()).map_err(|e| {
        Error::Config(format!("Invalid config file {}: {}", path.display(), e))
    })?;
    Ok(value)
}

/// Fold settings layers over the built-in defaults, lowest priority first.
fn resolve_layers(layers: impl IntoIterator<Item = Value>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())
        .map_err(|e| Error::Config(format!("Failed to encode default config: {e}")))?;
    for layer in layers {
        merge_json(&mut merged, layer);
    }
    serde_json::from_value(merged).map_err(|e| Error::Config(format!("Invalid config: {e}")))
}

/// Objects merge key by key; any other overlay value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(val) = std::env::var("LINKSHELF_JWT_ALGORITHM") {
        config.auth.algorithm = val;
    }
    if let Ok(val) = std::env::var("LINKSHELF_ACCESS_TTL_SECS") {
        config.auth.access_ttl_secs = parse_env("LINKSHELF_ACCESS_TTL_SECS", &val)?;
    }
    if let Ok(val) = std::env::var("LINKSHELF_REFRESH_TTL_SECS") {
        config.auth.refresh_ttl_secs = parse_env("LINKSHELF_REFRESH_TTL_SECS", &val)?;
    }
    if let Ok(val) = std::env::var("LINKSHELF_PRODUCTION") {
        config.auth.production = parse_env("LINKSHELF_PRODUCTION", &val)?;
    }
    if let Ok(val) = std::env::var("LINKSHELF_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("LINKSHELF_STORE_TIMEOUT_MS") {
        config.storage.store_timeout_ms = parse_env("LINKSHELF_STORE_TIMEOUT_MS", &val)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
}

/// Reject settings that would make sessions meaningless.
pub fn validate(config: &Config) -> Result<()> {
    if config.auth.access_ttl_secs <= 0 {
        return Err(Error::Config("auth.access_ttl_secs must be positive".into()));
    }
    if config.auth.refresh_ttl_secs < config.auth.access_ttl_secs {
        return Err(Error::Config(
            "auth.refresh_ttl_secs must not be shorter than auth.access_ttl_secs".into(),
        ));
    }
    if config.auth.cookie_name.is_empty() {
        return Err(Error::Config("auth.cookie_name must not be empty".into()));
    }
    if config.storage.store_timeout_ms == 0 {
        return Err(Error::Config("storage.store_timeout_ms must be positive".into()));
    }
    Ok(())
}
