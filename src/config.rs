//! Process-wide probe configuration.
//!
//! A [`ProbeConfig`] is built once (normally from the command line) and never
//! mutated afterwards. Only the identity and the community URL are required;
//! everything else has a default.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between probes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of probes before a clean exit.
pub const DEFAULT_PROBE_COUNT: u64 = 10;

/// Default length of the probe filler payload.
pub const DEFAULT_PAYLOAD_SIZE: usize = 25;

/// Default round-trip delay above which a probe counts as lagging.
pub const DEFAULT_MAX_LAG: Duration = Duration::from_secs(5);

/// Default number of ticks between ambient utterances.
pub const DEFAULT_TALK_EVERY: u32 = 5;

/// Default avatar image.
pub const DEFAULT_AVATAR: &str = "avs/av1.gif";

/// Default bound on reaching the Connected phase.
pub const DEFAULT_SIGN_ON_TIMEOUT: Duration = Duration::from_secs(30);

/// Where lag reports go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LagReporting {
    /// Broadcast the report into the shared room.
    #[default]
    Room,
    /// Write the report to the process log only.
    Log,
}

/// Immutable configuration for one probe run.
///
/// ```
/// use presence_probe::config::{LagReporting, ProbeConfig};
/// use std::time::Duration;
///
/// let config = ProbeConfig::new("probe1", "secret", "ws://chat.example:7777")
///     .with_interval(Duration::from_secs(1))
///     .with_probe_count(3)
///     .with_lag_reporting(LagReporting::Log);
/// assert_eq!(config.payload_size, 25);
/// ```
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Display name to sign on as.
    pub name: String,
    /// Credential for `name`.
    pub password: String,
    /// Community to connect to.
    pub community_url: String,
    /// Room to enter; `None` means the community lobby.
    pub room: Option<String>,
    /// Avatar image applied once after entering the room.
    pub avatar: PathBuf,
    /// Timer period.
    pub interval: Duration,
    /// Number of probes to send before exiting with success.
    pub probe_count: u64,
    /// Length of the filler text in each probe.
    pub payload_size: usize,
    /// Round-trip delay tolerated before reporting lag.
    pub max_lag: Duration,
    /// Lag report destination.
    pub lag_reporting: LagReporting,
    /// Ticks between ambient utterances (at least 1).
    pub talk_every: u32,
    /// Bound on reaching the Connected phase, counted from the start of the
    /// run, so a service that never greets is caught as well.
    pub sign_on_timeout: Duration,
}

impl ProbeConfig {
    /// Create a configuration with the required identity and default values.
    pub fn new(
        name: impl Into<String>,
        password: impl Into<String>,
        community_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            community_url: community_url.into(),
            room: None,
            avatar: PathBuf::from(DEFAULT_AVATAR),
            interval: DEFAULT_INTERVAL,
            probe_count: DEFAULT_PROBE_COUNT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            max_lag: DEFAULT_MAX_LAG,
            lag_reporting: LagReporting::Room,
            talk_every: DEFAULT_TALK_EVERY,
            sign_on_timeout: DEFAULT_SIGN_ON_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<PathBuf>) -> Self {
        self.avatar = avatar.into();
        self
    }

    /// Set the timer period. A zero interval is raised to one millisecond so
    /// the timer cannot spin.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn with_probe_count(mut self, count: u64) -> Self {
        self.probe_count = count;
        self
    }

    #[must_use]
    pub fn with_payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }

    #[must_use]
    pub fn with_max_lag(mut self, max_lag: Duration) -> Self {
        self.max_lag = max_lag;
        self
    }

    #[must_use]
    pub fn with_lag_reporting(mut self, reporting: LagReporting) -> Self {
        self.lag_reporting = reporting;
        self
    }

    /// Set the ambient speech cadence (clamped to at least 1 tick).
    #[must_use]
    pub fn with_talk_every(mut self, ticks: u32) -> Self {
        self.talk_every = ticks.max(1);
        self
    }

    #[must_use]
    pub fn with_sign_on_timeout(mut self, timeout: Duration) -> Self {
        self.sign_on_timeout = timeout;
        self
    }
}
