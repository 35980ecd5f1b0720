//! Queue configuration.

use std::time::Duration;

use tracing::warn;

/// Default base name of the queue's lists.
pub const DEFAULT_QUEUE_NAME: &str = "search:sync";

/// Default number of retries before a job is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bounded wait of a single dequeue.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pause after the consumer loop hits an engine error.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Process-level queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Base name; the four lists are derived from it.
    pub queue_name: String,
    /// Redis URL. `None` selects the in-memory store (dev only).
    pub redis_url: Option<String>,
    /// Failed attempts allowed before dead-lettering.
    pub max_retries: u32,
    /// How long a dequeue waits for work.
    pub poll_timeout: Duration,
    /// Consumer pause after an engine error (e.g. lost connection).
    pub error_backoff: Duration,
    /// Optional per-job handler deadline.
    pub job_timeout: Option<Duration>,
    /// Name for logging and the consumer thread.
    pub consumer_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            redis_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            job_timeout: None,
            consumer_name: "indexq-consumer".to_string(),
        }
    }
}

impl QueueConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `INDEXQ_QUEUE_NAME` | `queue_name` |
    /// | `REDIS_URL` | `redis_url` |
    /// | `INDEXQ_MAX_RETRIES` | `max_retries` |
    /// | `INDEXQ_POLL_TIMEOUT_SECS` | `poll_timeout` |
    /// | `INDEXQ_ERROR_BACKOFF_MS` | `error_backoff` |
    /// | `INDEXQ_JOB_TIMEOUT_SECS` | `job_timeout` |
    /// | `INDEXQ_CONSUMER_NAME` | `consumer_name` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`QueueConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| var(key).and_then(|v| parse_number(key, &v));

        Self {
            queue_name: var("INDEXQ_QUEUE_NAME").unwrap_or(defaults.queue_name),
            redis_url: var("REDIS_URL"),
            max_retries: number("INDEXQ_MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_retries),
            // Zero would make an idle consumer spin on non-blocking pops.
            poll_timeout: number("INDEXQ_POLL_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_timeout),
            error_backoff: number("INDEXQ_ERROR_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.error_backoff),
            job_timeout: number("INDEXQ_JOB_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            consumer_name: var("INDEXQ_CONSUMER_NAME").unwrap_or(defaults.consumer_name),
        }
    }

    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }
}

fn parse_number(key: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value = raw, "ignoring unparsable config value");
            None
        }
    }
}
