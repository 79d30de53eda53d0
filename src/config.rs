use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use thiserror::Error;
use url::Url;
use crate::delay_manager::DelayPolicy;
use crate::scraper::{DEFAULT_BASE_URL, DEFAULT_SYNONYM_CLASS, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Upper bound for `--delay` and `--jitter`, one day.
pub const MAX_PAUSE_SECS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--batch-size must be at least 1")]
    BatchSize,
    #[error("--{0} must be a number of seconds between 0 and 86400")]
    Seconds(&'static str),
    #[error("--timeout must be at least 1 second")]
    Timeout,
    #[error("--base-url {url:?} is not a valid URL: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("--synonym-class must not be empty")]
    SynonymClass,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cim_scraper", about = "Collect CIM-10 code synonyms into a spreadsheet, resuming interrupted runs")]
pub struct Config {
    /// Semicolon-delimited file (no header) or .xlsx listing the codes
    pub input: PathBuf,

    /// 0-based column holding the codes
    #[arg(short, long, default_value_t = 8)]
    pub column: usize,

    /// Output spreadsheet (.xlsx, or .csv for semicolon-delimited text)
    #[arg(short, long, default_value = "synonymes_cim.xlsx")]
    pub output: PathBuf,

    /// Checkpoint file used to resume an interrupted run
    #[arg(long, default_value = "checkpoint.json")]
    pub checkpoint: PathBuf,

    /// Seconds to wait between two requests
    #[arg(short, long, default_value_t = 3.0)]
    pub delay: f64,

    /// Extra random seconds added to each delay
    #[arg(long, default_value_t = 0.0)]
    pub jitter: f64,

    /// Save results and checkpoint every N processed codes
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Lookup site; codes are fetched from <base-url>/cim-<code>
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Class of the <li> elements holding synonyms
    #[arg(long, default_value = DEFAULT_SYNONYM_CLASS)]
    pub synonym_class: String,

    /// Process at most N codes in this run
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Ignore and remove any existing checkpoint
    #[arg(long)]
    pub fresh: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        if !is_pause(self.delay) {
            return Err(ConfigError::Seconds("delay"));
        }
        if !is_pause(self.jitter) {
            return Err(ConfigError::Seconds("jitter"));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Timeout);
        }
        if self.synonym_class.trim().is_empty() {
            return Err(ConfigError::SynonymClass);
        }
        Url::parse(&self.base_url).map_err(|source| ConfigError::BaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        Ok(())
    }

    /// Out-of-range values are clamped; `validate` reports them.
    pub fn delay_policy(&self) -> DelayPolicy {
        DelayPolicy::new(pause_duration(self.delay), pause_duration(self.jitter))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

fn is_pause(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_PAUSE_SECS).contains(&secs)
}

fn pause_duration(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(secs.clamp(0.0, MAX_PAUSE_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_lookup_site_conventions() {
        let config = Config::parse_from(["cim_scraper", "codes.csv"]);
        assert_eq!(config.column, 8);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.output, PathBuf::from("synonymes_cim.xlsx"));
        assert_eq!(config.checkpoint, PathBuf::from("checkpoint.json"));
        assert_eq!(config.delay_policy().next_delay(), Duration::from_secs(3));
        assert!(config.limit.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unusable_values() {
        let base = ["cim_scraper", "codes.csv"];
        let with = |extra: &[&str]| {
            let args: Vec<&str> = base.iter().chain(extra.iter()).copied().collect();
            Config::parse_from(args).validate()
        };
        assert!(matches!(with(&["--batch-size", "0"]), Err(ConfigError::BatchSize)));
        assert!(matches!(with(&["--delay=-1"]), Err(ConfigError::Seconds("delay"))));
        assert!(matches!(with(&["--timeout", "0"]), Err(ConfigError::Timeout)));
        assert!(matches!(with(&["--base-url", "not a url"]), Err(ConfigError::BaseUrl { .. })));
        assert!(matches!(with(&["--synonym-class", " "]), Err(ConfigError::SynonymClass)));
        assert!(matches!(with(&["--delay", "1e300"]), Err(ConfigError::Seconds("delay"))));
        assert!(matches!(with(&["--jitter", "86401"]), Err(ConfigError::Seconds("jitter"))));
        assert!(with(&["-n", "10", "--fresh", "--jitter", "0.5"]).is_ok());
    }

    #[test]
    fn huge_delays_are_clamped_instead_of_panicking() {
        let config = Config::parse_from(["cim_scraper", "codes.csv", "--delay", "1e300", "--jitter", "inf"]);
        assert!(config.validate().is_err());

        let policy = config.delay_policy();
        let longest = Duration::from_secs_f64(2.0 * MAX_PAUSE_SECS);
        assert!(policy.next_delay() <= longest);
    }
}
