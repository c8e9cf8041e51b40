//! Immutable export configuration built once at process start.
//!
//! Values come from the process environment (optionally seeded from a `.env`
//! file by the binary). [`ExportConfig::from_lookup`] takes the variable source
//! as a closure so tests never touch the real environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::download::RetryPolicy;
use crate::validation::validate_handle;

/// Default MySQL port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Default metadata database name.
pub const DEFAULT_DATABASE_NAME: &str = "prod_irts";

/// Default research community root.
pub const DEFAULT_RESEARCH_COMMUNITY: &str = "10754/324602";

/// Default theses and dissertations community root.
pub const DEFAULT_ETD_COMMUNITY: &str = "10754/124545";

/// Default prefix for fully-qualified handle URLs.
pub const DEFAULT_HANDLE_BASE_URL: &str = "http://hdl.handle.net/";

/// Default connect timeout for repository API requests.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default read timeout for repository API requests.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default total attempts per content fetch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff in seconds.
pub const DEFAULT_RETRY_BACKOFF_SECS: f64 = 1.0;

/// Default backoff cap in seconds.
pub const DEFAULT_RETRY_MAX_BACKOFF_SECS: f64 = 10.0;

/// Default file size ceiling (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default tracked file suffix.
pub const DEFAULT_FILE_SUFFIX: &str = "pdf";

/// Default tracked MIME type.
pub const DEFAULT_MIME_TYPE: &str = "application/pdf";

/// Optional log file, read by the binary before logging starts.
pub const LOG_FILE_VAR: &str = "EXPORT_LOG_FILE";

const REQUIRED_REPOSITORY_VARS: [&str; 4] = [
    "REPOSITORY_USER",
    "REPOSITORY_PASSWORD",
    "REPOSITORY_API_URL",
    "LIBSAFE_EXPORT_DIRECTORY",
];

const REQUIRED_MYSQL_VARS: [&str; 3] = ["MYSQL_SERVER_IP", "MYSQL_USER", "MYSQL_PASSWORD"];

/// Configuration errors. Any of these prevents the process from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required variables are unset or empty.
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A variable is set but cannot be interpreted.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The export directory does not exist or is not a directory.
    #[error("export directory does not exist: {}", .0.display())]
    ExportDirMissing(PathBuf),
}

impl ConfigError {
    fn invalid(var: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Credentials and endpoint for the repository REST API.
#[derive(Clone)]
pub struct RepositoryConfig {
    /// API base URL, always ending in `/`.
    pub api_url: Url,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub read_timeout: Duration,
    /// Retry policy for transient fetch failures.
    pub retry_policy: RetryPolicy,
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("api_url", &self.api_url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// Complete, validated configuration for one export run.
#[derive(Clone)]
pub struct ExportConfig {
    database_url: String,
    /// Repository API settings.
    pub repository: RepositoryConfig,
    /// Existing directory receiving files and the CSV index.
    pub export_dir: PathBuf,
    /// The two parent-collection roots records must belong to.
    pub community_handles: [String; 2],
    /// Prefix for the CSV `Handle` column.
    pub handle_base_url: String,
    /// Downloads larger than this are rejected.
    pub max_file_size: u64,
    /// Tracked file extension, without the dot.
    pub file_suffix: String,
    /// Tracked MIME type.
    pub mime_type: String,
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("database_url", &"<redacted>")
            .field("repository", &self.repository)
            .field("export_dir", &self.export_dir)
            .field("community_handles", &self.community_handles)
            .field("handle_base_url", &self.handle_base_url)
            .field("max_file_size", &self.max_file_size)
            .field("file_suffix", &self.file_suffix)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl ExportConfig {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ExportConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// All missing required variables are reported in one error. The export
    /// directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`], [`ConfigError::Invalid`], or
    /// [`ConfigError::ExportDirMissing`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let explicit_database_url = get("METADATA_DATABASE_URL");
        let mut missing: Vec<String> = REQUIRED_REPOSITORY_VARS
            .iter()
            .filter(|name| get(**name).is_none())
            .map(|name| (*name).to_string())
            .collect();
        if explicit_database_url.is_none() {
            missing.extend(
                REQUIRED_MYSQL_VARS
                    .iter()
                    .filter(|name| get(**name).is_none())
                    .map(|name| (*name).to_string()),
            );
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(ConfigError::Missing(missing));
        }

        let required =
            |name: &str| get(name).ok_or_else(|| ConfigError::Missing(vec![name.to_string()]));

        let database_url = match explicit_database_url {
            Some(url) => url,
            None => {
                let port = parse_or(&get, "MYSQL_PORT", DEFAULT_MYSQL_PORT)?;
                let database =
                    get("IRTS_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string());
                format!(
                    "mysql://{}:{}@{}:{}/{}",
                    urlencoding::encode(&required("MYSQL_USER")?),
                    urlencoding::encode(&required("MYSQL_PASSWORD")?),
                    required("MYSQL_SERVER_IP")?,
                    port,
                    urlencoding::encode(&database),
                )
            }
        };

        let api_url = parse_api_url(&required("REPOSITORY_API_URL")?)?;

        let export_dir = PathBuf::from(required("LIBSAFE_EXPORT_DIRECTORY")?);
        if !export_dir.is_dir() {
            return Err(ConfigError::ExportDirMissing(export_dir));
        }

        let research = community(&get, "EXPORT_RESEARCH_COMMUNITY", DEFAULT_RESEARCH_COMMUNITY)?;
        let etd = community(&get, "EXPORT_ETD_COMMUNITY", DEFAULT_ETD_COMMUNITY)?;

        let max_attempts: u32 = parse_or(&get, "MAX_RETRIES", DEFAULT_MAX_ATTEMPTS)?;
        let backoff = seconds_or(&get, "RETRY_BACKOFF_SECS", DEFAULT_RETRY_BACKOFF_SECS)?;
        let max_backoff =
            seconds_or(&get, "RETRY_MAX_BACKOFF_SECS", DEFAULT_RETRY_MAX_BACKOFF_SECS)?;

        let repository = RepositoryConfig {
            api_url,
            username: required("REPOSITORY_USER")?,
            password: required("REPOSITORY_PASSWORD")?,
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "REQUEST_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            read_timeout: Duration::from_secs(parse_or(
                &get,
                "REQUEST_READ_TIMEOUT_SECS",
                DEFAULT_READ_TIMEOUT_SECS,
            )?),
            retry_policy: RetryPolicy::new(max_attempts, backoff, max_backoff.max(backoff), 2.0),
        };

        let file_suffix =
            get("EXPORT_FILE_SUFFIX").unwrap_or_else(|| DEFAULT_FILE_SUFFIX.to_string());
        let file_suffix = file_suffix.trim_start_matches('.').to_string();
        if file_suffix.is_empty() || !file_suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::invalid(
                "EXPORT_FILE_SUFFIX",
                &file_suffix,
                "expected an alphanumeric extension",
            ));
        }

        Ok(Self {
            database_url,
            repository,
            export_dir,
            community_handles: [research, etd],
            handle_base_url: get("HANDLE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_HANDLE_BASE_URL.to_string()),
            max_file_size: parse_or(&get, "MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE)?,
            file_suffix,
            mime_type: get("EXPORT_MIME_TYPE").unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        })
    }

    /// Connection URL for the metadata store. Contains credentials; never log it.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Path of the CSV index inside the export directory.
    #[must_use]
    pub fn csv_path(&self) -> PathBuf {
        self.export_dir.join(crate::export::CSV_FILE_NAME)
    }
}

fn parse_or<T, G>(get: &G, var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::invalid(var, &raw, "expected a non-negative integer")),
    }
}

fn seconds_or<G>(get: &G, var: &str, default: f64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(var) else {
        return Ok(Duration::from_secs_f64(default));
    };
    raw.parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ConfigError::invalid(var, &raw, "expected seconds >= 0 within range"))
}

fn community<G>(get: &G, var: &str, default: &str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(var).unwrap_or_else(|| default.to_string());
    validate_handle(&value).map_err(|e| ConfigError::invalid(var, &value, e.to_string()))?;
    Ok(value)
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ConfigError::invalid("REPOSITORY_API_URL", raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "REPOSITORY_API_URL",
            raw,
            "expected an http or https URL",
        ));
    }
    Ok(url)
}
