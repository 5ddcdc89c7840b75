//! Configuration management
//!
//! Configuration is read from a YAML file (`config.yml` by default) and can be
//! overridden with `EAST_*` environment variables. Missing values are filled
//! with defaults, so an absent or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::object::Direction;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// SMTP settings; recovery notifications are only logged when absent
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL, used to build links sent by email
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name shown in page titles and emails
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            site_name: default_site_name(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_site_name() -> String {
    "East Website".to_string()
}

/// Database configuration (SQLite file path or `:memory:`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/east.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory whose templates override the embedded defaults
    #[serde(default = "default_templates_path")]
    pub path: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: default_templates_path(),
        }
    }
}

fn default_templates_path() -> PathBuf {
    PathBuf::from("templates")
}

/// Media storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory where uploaded media files are stored
    #[serde(default = "default_media_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            path: default_media_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_media_path() -> PathBuf {
    PathBuf::from("data/media")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/svg+xml".to_string(),
        "application/pdf".to_string(),
    ]
}

impl MediaConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// Kind of front-end asset handled by the minifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Css,
    Js,
}

impl AssetKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Css => "text/css; charset=utf-8",
            Self::Js => "application/javascript; charset=utf-8",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "css" => Ok(Self::Css),
            "js" => Ok(Self::Js),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

/// A named set of source files minified into a single asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSet {
    pub kind: AssetKind,
    /// Source files, relative to `AssetsConfig::source_path`
    pub files: Vec<PathBuf>,
    /// Versions clients may request besides `AssetsConfig::default_version`
    #[serde(default)]
    pub versions: Vec<String>,
}

impl AssetSet {
    /// Whether `version` of this set may be built for a client
    pub fn publishes(&self, version: &str, default_version: &str) -> bool {
        version == default_version || self.versions.iter().any(|known| known == version)
    }
}

/// Asset minification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_source")]
    pub source_path: PathBuf,
    /// Directory where minified assets are persisted
    #[serde(default = "default_assets_output")]
    pub output_path: PathBuf,
    /// Version used when the request does not name one
    #[serde(default = "default_assets_version")]
    pub default_version: String,
    #[serde(default)]
    pub sets: BTreeMap<String, AssetSet>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            source_path: default_assets_source(),
            output_path: default_assets_output(),
            default_version: default_assets_version(),
            sets: BTreeMap::new(),
        }
    }
}

fn default_assets_source() -> PathBuf {
    PathBuf::from("assets")
}

fn default_assets_output() -> PathBuf {
    PathBuf::from("public/build")
}

fn default_assets_version() -> String {
    "latest".to_string()
}

/// Listing defaults shared by every list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    #[serde(default)]
    pub default_order_direction: Direction,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            default_order_direction: Direction::default(),
        }
    }
}

fn default_items_per_page() -> u32 {
    15
}

/// Authentication, TOTP and recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Issuer shown by authenticator applications
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    #[serde(default = "default_totp_digits")]
    pub totp_digits: u32,
    #[serde(default = "default_totp_period")]
    pub totp_period: u64,
    /// Lifetime of a recovery access link in minutes
    #[serde(default = "default_recovery_ttl")]
    pub recovery_ttl_minutes: i64,
    /// Failed password or code attempts per account before it is locked
    #[serde(default = "default_login_max_failures")]
    pub login_max_failures: usize,
    /// Window, in minutes, failed attempts are counted over
    #[serde(default = "default_login_failure_window")]
    pub login_failure_window_minutes: i64,
    /// Login attempts per client address and minute
    #[serde(default = "default_login_requests_per_minute")]
    pub login_requests_per_minute: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            totp_issuer: default_totp_issuer(),
            totp_digits: default_totp_digits(),
            totp_period: default_totp_period(),
            recovery_ttl_minutes: default_recovery_ttl(),
            login_max_failures: default_login_max_failures(),
            login_failure_window_minutes: default_login_failure_window(),
            login_requests_per_minute: default_login_requests_per_minute(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_totp_issuer() -> String {
    "East Website".to_string()
}

fn default_totp_digits() -> u32 {
    6
}

fn default_totp_period() -> u64 {
    30
}

fn default_recovery_ttl() -> i64 {
    60
}

fn default_login_max_failures() -> usize {
    5
}

fn default_login_failure_window() -> i64 {
    15
}

fn default_login_requests_per_minute() -> usize {
    10
}

/// SMTP relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    #[serde(default = "default_smtp_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from_name() -> String {
    "East Website".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration. An invalid
    /// file is an error carrying the YAML location.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    ///
    /// Recognised variables:
    /// - EAST_SERVER_HOST, EAST_SERVER_PORT, EAST_SERVER_BASE_URL
    /// - EAST_DATABASE_URL
    /// - EAST_TEMPLATES_PATH
    /// - EAST_MEDIA_PATH
    /// - EAST_ASSETS_SOURCE_PATH, EAST_ASSETS_OUTPUT_PATH
    /// - EAST_LISTING_ITEMS_PER_PAGE
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("EAST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("EAST_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(base_url) = std::env::var("EAST_SERVER_BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Ok(url) = std::env::var("EAST_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(path) = std::env::var("EAST_TEMPLATES_PATH") {
            self.templates.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("EAST_MEDIA_PATH") {
            self.media.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("EAST_ASSETS_SOURCE_PATH") {
            self.assets.source_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("EAST_ASSETS_OUTPUT_PATH") {
            self.assets.output_path = PathBuf::from(path);
        }
        if let Ok(per_page) = std::env::var("EAST_LISTING_ITEMS_PER_PAGE") {
            if let Ok(per_page) = per_page.parse::<u32>() {
                self.listing.items_per_page = per_page;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listing.items_per_page == 0 {
            return Err(ConfigError::ValidationError(
                "listing.items_per_page must be greater than zero".to_string(),
            ));
        }
        if !(6..=8).contains(&self.security.totp_digits) {
            return Err(ConfigError::ValidationError(format!(
                "security.totp_digits must be between 6 and 8, got {}",
                self.security.totp_digits
            )));
        }
        if self.security.totp_period == 0 {
            return Err(ConfigError::ValidationError(
                "security.totp_period must be greater than zero".to_string(),
            ));
        }
        if self.security.totp_issuer.contains(':') {
            return Err(ConfigError::ValidationError(
                "security.totp_issuer must not contain ':'".to_string(),
            ));
        }
        if self.security.login_max_failures == 0 || self.security.login_requests_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "security login limits must be greater than zero".to_string(),
            ));
        }
        for (name, set) in &self.assets.sets {
            if set.files.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "asset set '{}' has no files",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every config test that touches the process environment.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
