use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scrubline_application::DEFAULT_BATCH_LIMIT;
use scrubline_core::{AppError, AppResult};

const DEFAULT_LOCK_SECONDS: u32 = 300;

/// What one worker invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Anonymize every declared type, once or on an interval.
    Run,
    /// Apply database migrations and exit.
    Migrate,
    /// Print anonymizable types and exit.
    List,
}

impl WorkerMode {
    pub fn from_args(mut args: impl Iterator<Item = String>) -> AppResult<Self> {
        match args.next().as_deref() {
            None | Some("run") => Ok(Self::Run),
            Some("migrate") => Ok(Self::Migrate),
            Some("list") => Ok(Self::List),
            Some(other) => Err(AppError::Validation(format!(
                "unknown worker command '{other}', expected 'run', 'migrate' or 'list'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunLockConfig {
    pub redis_url: String,
    pub worker_id: String,
    pub lease_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    manifest_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub batch_limit: usize,
    pub interval: Option<Duration>,
    pub run_lock: Option<RunLockConfig>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let manifest_path = read("ANONYMIZER_MANIFEST_PATH").map(PathBuf::from);
        let database_url = read("DATABASE_URL");

        let batch_limit = parse_or(
            "ANONYMIZER_BATCH_LIMIT",
            read("ANONYMIZER_BATCH_LIMIT"),
            DEFAULT_BATCH_LIMIT,
        )?;
        if batch_limit == 0 {
            return Err(AppError::Validation(
                "ANONYMIZER_BATCH_LIMIT must be greater than zero".to_owned(),
            ));
        }

        let interval_seconds: u64 = parse_or(
            "ANONYMIZER_INTERVAL_SECONDS",
            read("ANONYMIZER_INTERVAL_SECONDS"),
            0,
        )?;
        let interval = (interval_seconds > 0).then(|| Duration::from_secs(interval_seconds));

        let run_lock = match read("REDIS_URL") {
            Some(redis_url) => {
                let lease_seconds = parse_or(
                    "ANONYMIZER_LOCK_SECONDS",
                    read("ANONYMIZER_LOCK_SECONDS"),
                    DEFAULT_LOCK_SECONDS,
                )?;
                if lease_seconds == 0 {
                    return Err(AppError::Validation(
                        "ANONYMIZER_LOCK_SECONDS must be greater than zero".to_owned(),
                    ));
                }

                let worker_id = read("ANONYMIZER_WORKER_ID")
                    .unwrap_or_else(|| format!("anonymizer-{}", std::process::id()));

                Some(RunLockConfig {
                    redis_url,
                    worker_id,
                    lease_seconds,
                })
            }
            None => None,
        };

        Ok(Self {
            manifest_path,
            database_url,
            batch_limit,
            interval,
            run_lock,
        })
    }

    pub fn manifest_path(&self) -> AppResult<&Path> {
        self.manifest_path.as_deref().ok_or_else(|| {
            AppError::Configuration("ANONYMIZER_MANIFEST_PATH is required".to_owned())
        })
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use scrubline_core::AppError;

    use super::{WorkerConfig, WorkerMode};

    fn config_from(pairs: &[(&str, &str)]) -> Result<WorkerConfig, AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        WorkerConfig::from_lookup(|name| values.get(name).cloned())
    }

    #[test]
    fn defaults_to_single_pass_without_lock() {
        let config = config_from(&[("ANONYMIZER_MANIFEST_PATH", "config/anonymization.json")]);
        assert!(config.is_ok());
        let config = config.unwrap_or_else(|_| unreachable!());

        assert_eq!(config.batch_limit, 100);
        assert!(config.interval.is_none());
        assert!(config.run_lock.is_none());
        assert!(config.database_url.is_none());
        assert!(config.manifest_path().is_ok());
    }

    #[test]
    fn reads_interval_and_lock_settings() {
        let config = config_from(&[
            ("ANONYMIZER_BATCH_LIMIT", "25"),
            ("ANONYMIZER_INTERVAL_SECONDS", "3600"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("ANONYMIZER_WORKER_ID", "anonymizer-a"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.batch_limit, 25);
        assert_eq!(config.interval, Some(Duration::from_secs(3600)));
        let run_lock = config.run_lock.clone().unwrap_or_else(|| unreachable!());
        assert_eq!(run_lock.worker_id, "anonymizer-a");
        assert_eq!(run_lock.lease_seconds, 300);
        assert!(matches!(
            config.manifest_path(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_invalid_numbers() {
        assert!(matches!(
            config_from(&[("ANONYMIZER_BATCH_LIMIT", "0")]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            config_from(&[("ANONYMIZER_INTERVAL_SECONDS", "hourly")]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            config_from(&[
                ("REDIS_URL", "redis://localhost"),
                ("ANONYMIZER_LOCK_SECONDS", "0"),
            ]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn parses_worker_commands() {
        let parse =
            |args: &[&str]| WorkerMode::from_args(args.iter().map(|arg| (*arg).to_owned()));

        assert!(matches!(parse(&[]), Ok(WorkerMode::Run)));
        assert!(matches!(parse(&["migrate"]), Ok(WorkerMode::Migrate)));
        assert!(matches!(parse(&["list"]), Ok(WorkerMode::List)));
        assert!(matches!(parse(&["purge"]), Err(AppError::Validation(_))));
    }
}
