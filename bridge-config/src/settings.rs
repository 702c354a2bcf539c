//! Immutable agent settings.

use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};
use std::time::Duration;

use tracing::debug;

use crate::{AgentCredentials, ConfigError, ConfigResult, NodeConfig, normalize_private_key};

/// Interval between keep-alive token renewals.
pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(60 * 60);

const DEFAULT_RETRY: u32 = 3;
const DEFAULT_PARALLEL: usize = 1;
const DEFAULT_ASYNC_DURATION_SECS: u64 = 10;

/// Validated settings read by every operation.
///
/// Settings are never edited in place; reconfiguration builds a new value and
/// swaps it in, so in-flight operations keep the snapshot they started with.
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct AgentSettings {
    name: String,
    credentials: AgentCredentials,
    private_key: Option<String>,
    validate: bool,
    validate_event: bool,
    chunk: bool,
    keep_alive: bool,
    emit_control: bool,
    data_lake_only: bool,
    suppress_verbosity: bool,
    retry: NonZeroU32,
    parallel: NonZeroUsize,
    async_duration: Duration,
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("name", &self.name)
            .field("client_id", &self.credentials.client_id())
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("keep_alive", &self.keep_alive)
            .field("retry", &self.retry)
            .field("parallel", &self.parallel)
            .field("async_duration", &self.async_duration)
            .finish_non_exhaustive()
    }
}

impl AgentSettings {
    /// Starts building settings for the supplied credentials.
    #[must_use]
    pub fn builder(credentials: AgentCredentials) -> AgentSettingsBuilder {
        AgentSettingsBuilder::new(credentials)
    }

    /// Validates a node configuration into settings.
    ///
    /// Missing `parallel` and `asyncduration` default to 1 request and 10 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric setting is malformed or zero, the
    /// credentials cannot be decoded, or the private key framing is wrong.
    pub fn from_config(config: &NodeConfig) -> ConfigResult<Self> {
        let mut builder = Self::builder(config.agentconfig.credentials()?)
            .name(config.name.clone())
            .private_key(config.privatekey.clone())
            .validate(config.validate)
            .validate_event(config.validate_event)
            .chunk(config.chunk)
            .keep_alive(!config.disable_keep_alive)
            .emit_control(config.emit_control)
            .data_lake_only(config.data_lake_only)
            .suppress_verbosity(config.suppress_verbosity);

        if let Some(retry) = resolve(config.retry.as_ref(), "retry")? {
            let retry = u32::try_from(retry)
                .map_err(|_| ConfigError::invalid_field("retry", "too large"))?;
            builder = builder.retry(retry);
        }
        if let Some(parallel) = resolve(config.parallel.as_ref(), "parallel")? {
            let parallel = usize::try_from(parallel)
                .map_err(|_| ConfigError::invalid_field("parallel", "too large"))?;
            builder = builder.parallel(parallel);
        }
        if let Some(seconds) = resolve(config.async_duration.as_ref(), "asyncduration")? {
            builder = builder.async_duration(Duration::from_secs(seconds));
        }

        let settings = builder.build()?;
        debug!(?settings, "agent settings validated");
        Ok(settings)
    }

    /// Returns the node display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the agent credentials.
    #[must_use]
    pub fn credentials(&self) -> &AgentCredentials {
        &self.credentials
    }

    /// Returns the normalised private key for the `RSA_3072` profile.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// Validate time series before posting.
    #[must_use]
    pub const fn validate(&self) -> bool {
        self.validate
    }

    /// Validate events before posting.
    #[must_use]
    pub const fn validate_event(&self) -> bool {
        self.validate_event
    }

    /// Upload files in chunks.
    #[must_use]
    pub const fn chunk(&self) -> bool {
        self.chunk
    }

    /// Renew the token every [`KEEP_ALIVE_PERIOD`].
    #[must_use]
    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Forward drain summaries on the `control` topic.
    #[must_use]
    pub const fn emit_control(&self) -> bool {
        self.emit_control
    }

    /// Skip fetching the data source configuration.
    #[must_use]
    pub const fn data_lake_only(&self) -> bool {
        self.data_lake_only
    }

    /// Only report errors and retries as status.
    #[must_use]
    pub const fn suppress_verbosity(&self) -> bool {
        self.suppress_verbosity
    }

    /// Attempts per outbound call.
    #[must_use]
    pub const fn retry(&self) -> NonZeroU32 {
        self.retry
    }

    /// Requests collected before the batch is drained.
    #[must_use]
    pub const fn parallel(&self) -> NonZeroUsize {
        self.parallel
    }

    /// Interval between periodic drains, also the longest a drain waits.
    #[must_use]
    pub const fn async_duration(&self) -> Duration {
        self.async_duration
    }

    /// Summarises the settings for the start-up log and status.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut summary = String::new();
        if self.validate {
            summary.push_str("validates timeseries ");
        }
        if self.validate_event {
            summary.push_str("validates events ");
        }
        if self.chunk {
            summary.push_str("chunked upload ");
        }
        if self.keep_alive {
            summary.push_str("keep-alive rotation: every hour");
        } else {
            summary.push_str("disabled keep-alive");
        }
        let control = if self.emit_control { "enabled" } else { "disabled" };
        format!(
            "settings: {summary} control topic: {control} parallel requests: {} async requests wait: {}s retries: {}",
            self.parallel,
            self.async_duration.as_secs(),
            self.retry
        )
    }
}

fn resolve(
    setting: Option<&crate::NumericSetting>,
    field: &'static str,
) -> ConfigResult<Option<u64>> {
    setting.map_or(Ok(None), |value| value.resolve(field))
}

/// Builder for [`AgentSettings`].
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct AgentSettingsBuilder {
    name: String,
    credentials: AgentCredentials,
    private_key: String,
    validate: bool,
    validate_event: bool,
    chunk: bool,
    keep_alive: bool,
    emit_control: bool,
    data_lake_only: bool,
    suppress_verbosity: bool,
    retry: u32,
    parallel: usize,
    async_duration: Duration,
}

impl AgentSettingsBuilder {
    fn new(credentials: AgentCredentials) -> Self {
        Self {
            name: String::new(),
            credentials,
            private_key: String::new(),
            validate: false,
            validate_event: false,
            chunk: false,
            keep_alive: true,
            emit_control: false,
            data_lake_only: false,
            suppress_verbosity: false,
            retry: DEFAULT_RETRY,
            parallel: DEFAULT_PARALLEL,
            async_duration: Duration::from_secs(DEFAULT_ASYNC_DURATION_SECS),
        }
    }

    /// Sets the node display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the PEM private key, checked when the profile is `RSA_3072`.
    #[must_use]
    pub fn private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = key.into();
        self
    }

    /// Enables time series validation.
    #[must_use]
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    /// Enables event validation.
    #[must_use]
    pub fn validate_event(mut self, enabled: bool) -> Self {
        self.validate_event = enabled;
        self
    }

    /// Enables chunked file upload.
    #[must_use]
    pub fn chunk(mut self, enabled: bool) -> Self {
        self.chunk = enabled;
        self
    }

    /// Enables hourly token renewal.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Enables control topic summaries.
    #[must_use]
    pub fn emit_control(mut self, enabled: bool) -> Self {
        self.emit_control = enabled;
        self
    }

    /// Enables data-lake-only mode.
    #[must_use]
    pub fn data_lake_only(mut self, enabled: bool) -> Self {
        self.data_lake_only = enabled;
        self
    }

    /// Suppresses non-error status reports.
    #[must_use]
    pub fn suppress_verbosity(mut self, enabled: bool) -> Self {
        self.suppress_verbosity = enabled;
        self
    }

    /// Sets the attempts per outbound call; must be at least 1.
    #[must_use]
    pub fn retry(mut self, attempts: u32) -> Self {
        self.retry = attempts;
        self
    }

    /// Sets the batch size that triggers a drain; must be at least 1.
    #[must_use]
    pub fn parallel(mut self, requests: usize) -> Self {
        self.parallel = requests;
        self
    }

    /// Sets the periodic drain interval; must be at least one second.
    #[must_use]
    pub fn async_duration(mut self, interval: Duration) -> Self {
        self.async_duration = interval;
        self
    }

    /// Validates and builds the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for zero retries, parallelism or drain
    /// interval, and [`ConfigError::InvalidCredentials`] when an `RSA_3072` profile
    /// comes with a malformed private key.
    pub fn build(self) -> ConfigResult<AgentSettings> {
        let retry = NonZeroU32::new(self.retry)
            .ok_or_else(|| ConfigError::invalid_field("retry", "at least one attempt is required"))?;
        let parallel = NonZeroUsize::new(self.parallel)
            .ok_or_else(|| ConfigError::invalid_field("parallel", "must be at least 1"))?;
        if self.async_duration.as_secs() == 0 {
            return Err(ConfigError::invalid_field(
                "asyncduration",
                "must be at least one second",
            ));
        }

        let private_key = if self.credentials.requires_private_key() {
            Some(normalize_private_key(&self.private_key)?)
        } else {
            None
        };

        Ok(AgentSettings {
            name: self.name,
            credentials: self.credentials,
            private_key,
            validate: self.validate,
            validate_event: self.validate_event,
            chunk: self.chunk,
            keep_alive: self.keep_alive,
            emit_control: self.emit_control,
            data_lake_only: self.data_lake_only,
            suppress_verbosity: self.suppress_verbosity,
            retry,
            parallel,
            async_duration: self.async_duration,
        })
    }
}
