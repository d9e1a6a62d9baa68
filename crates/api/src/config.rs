use leadimport_core::duplicate_detection::MAX_LOOKUP_BATCH;
use leadimport_core::mapping::DEFAULT_AUTO_MAP_THRESHOLD;
use leadimport_core::parser::{ParseOptions, DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_ROWS};
use leadimport_pipeline::commit::CommitOptions;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running imports to stop (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub import: ImportSettings,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            import: ImportSettings::from_env(),
        }
    }
}

/// Upload ceilings, auto-mapping, duplicate lookups and commit worker tuning.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub max_file_bytes: usize,
    pub max_rows: usize,
    pub auto_map_threshold: f64,
    pub fetch_batch_size: usize,
    pub write_batch_size: usize,
    pub lookup_batch_size: usize,
    pub lease_stale_after_secs: i64,
    /// How long `POST /imports/commit` waits for the worker before answering
    /// with the job id only. Keep it below the request timeout.
    pub commit_wait_secs: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        let commit = CommitOptions::default();
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rows: DEFAULT_MAX_ROWS,
            auto_map_threshold: DEFAULT_AUTO_MAP_THRESHOLD,
            fetch_batch_size: commit.fetch_batch_size,
            write_batch_size: commit.write_batch_size,
            lookup_batch_size: MAX_LOOKUP_BATCH,
            lease_stale_after_secs: commit.lease_stale_after_secs,
            commit_wait_secs: 20,
        }
    }
}

impl ImportSettings {
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `IMPORT_MAX_FILE_BYTES`          | 10 MiB  |
    /// | `IMPORT_MAX_ROWS`                | `10000` |
    /// | `IMPORT_AUTO_MAP_THRESHOLD`      | `0.7`   |
    /// | `IMPORT_FETCH_BATCH_SIZE`        | `1000`  |
    /// | `IMPORT_WRITE_BATCH_SIZE`        | `100`   |
    /// | `IMPORT_LOOKUP_BATCH_SIZE`       | `100`   |
    /// | `IMPORT_LEASE_STALE_AFTER_SECS`  | `300`   |
    /// | `IMPORT_COMMIT_WAIT_SECS`        | `20`    |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_file_bytes: env_or("IMPORT_MAX_FILE_BYTES", defaults.max_file_bytes),
            max_rows: env_or("IMPORT_MAX_ROWS", defaults.max_rows),
            auto_map_threshold: env_or("IMPORT_AUTO_MAP_THRESHOLD", defaults.auto_map_threshold),
            fetch_batch_size: env_or("IMPORT_FETCH_BATCH_SIZE", defaults.fetch_batch_size),
            write_batch_size: env_or("IMPORT_WRITE_BATCH_SIZE", defaults.write_batch_size),
            lookup_batch_size: env_or("IMPORT_LOOKUP_BATCH_SIZE", defaults.lookup_batch_size),
            lease_stale_after_secs: env_or("IMPORT_LEASE_STALE_AFTER_SECS", defaults.lease_stale_after_secs),
            commit_wait_secs: env_or("IMPORT_COMMIT_WAIT_SECS", defaults.commit_wait_secs),
        }
    }

    pub fn parse_options(&self, has_header: bool) -> ParseOptions {
        ParseOptions {
            has_header,
            max_file_bytes: self.max_file_bytes,
            max_rows: self.max_rows,
        }
    }

    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            fetch_batch_size: self.fetch_batch_size,
            write_batch_size: self.write_batch_size,
            lease_stale_after_secs: self.lease_stale_after_secs,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or(key, std::env::var(key).ok(), default)
}

/// Parse a raw setting, warning when a present value is not usable.
fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_setting_uses_default() {
        assert_eq!(parse_or::<usize>("IMPORT_MAX_ROWS", None, 10), 10);
    }

    #[test]
    fn setting_is_trimmed_and_parsed() {
        assert_eq!(parse_or::<usize>("IMPORT_MAX_ROWS", Some(" 250 ".into()), 10), 250);
    }

    #[test]
    fn unparseable_setting_falls_back_to_default() {
        assert_eq!(parse_or::<usize>("IMPORT_MAX_ROWS", Some("lots".into()), 10), 10);
        assert_eq!(parse_or::<f64>("IMPORT_AUTO_MAP_THRESHOLD", Some("0,6".into()), 0.6), 0.6);
    }
}
