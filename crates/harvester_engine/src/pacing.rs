use std::time::Duration;

use engine_logging::{engine_debug, engine_info};
use harvester_core::SessionState;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Inclusive range of milliseconds a pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DurationRange {
    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn secs(min: u64, max: u64) -> Self {
        Self::millis(min * 1000, max * 1000)
    }

    pub fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Uniform draw; a collapsed or inverted range yields `min_ms`.
    pub fn sample(&self) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Master switch; when off every pacing sleep is skipped.
    pub safe_rate_limits: bool,
    pub micro_jitter: DurationRange,
    pub settle: DurationRange,
    pub between_rounds: DurationRange,
    pub rows_per_cooldown: u64,
    pub row_cooldown: DurationRange,
    pub rounds_per_cooldown: u64,
    pub round_cooldown: DurationRange,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            safe_rate_limits: true,
            micro_jitter: DurationRange::millis(50, 150),
            settle: DurationRange::millis(350, 550),
            between_rounds: DurationRange::millis(600, 1200),
            rows_per_cooldown: 40,
            row_cooldown: DurationRange::secs(35, 90),
            rounds_per_cooldown: 3,
            round_cooldown: DurationRange::secs(20, 60),
        }
    }
}

impl PacingConfig {
    /// No sleeps at all, for dry runs and tests.
    pub fn disabled() -> Self {
        Self {
            safe_rate_limits: false,
            ..Self::default()
        }
    }

    pub(crate) fn ranges(&self) -> [(&'static str, DurationRange); 5] {
        [
            ("micro_jitter", self.micro_jitter),
            ("settle", self.settle),
            ("between_rounds", self.between_rounds),
            ("row_cooldown", self.row_cooldown),
            ("round_cooldown", self.round_cooldown),
        ]
    }
}

/// Timing policy of the harvest loop. All waits go through `tokio::time`.
#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacingConfig,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.safe_rate_limits
    }

    /// Short jitter after every processed item.
    pub async fn micro_pause(&self) -> Duration {
        self.sleep_in(self.config.micro_jitter).await
    }

    /// Delay before the first round is read.
    pub async fn settle(&self) -> Duration {
        self.sleep_in(self.config.settle).await
    }

    /// Jitter after a successful advance.
    pub async fn between_rounds(&self) -> Duration {
        self.sleep_in(self.config.between_rounds).await
    }

    pub fn row_cooldown_due(&self, session: &SessionState) -> bool {
        self.enabled()
            && self.config.rows_per_cooldown > 0
            && session.rows_since_cooldown() >= self.config.rows_per_cooldown
    }

    pub fn round_cooldown_due(&self, session: &SessionState) -> bool {
        self.enabled()
            && self.config.rounds_per_cooldown > 0
            && session.rounds_since_cooldown() >= self.config.rounds_per_cooldown
    }

    /// Sleeps the long row cooldown once enough rows were inserted since the
    /// last one, resetting the row counter.
    pub async fn maybe_row_cooldown(&self, session: &mut SessionState) -> Option<Duration> {
        if !self.row_cooldown_due(session) {
            return None;
        }
        let pause = self.config.row_cooldown.sample();
        engine_info!(
            "Cooling down for {:.1}s after {} new rows",
            pause.as_secs_f64(),
            session.rows_since_cooldown()
        );
        tokio::time::sleep(pause).await;
        session.reset_row_cooldown();
        Some(pause)
    }

    pub async fn maybe_round_cooldown(&self, session: &mut SessionState) -> Option<Duration> {
        if !self.round_cooldown_due(session) {
            return None;
        }
        let pause = self.config.round_cooldown.sample();
        engine_info!(
            "Cooling down for {:.1}s after {} rounds",
            pause.as_secs_f64(),
            session.rounds_since_cooldown()
        );
        tokio::time::sleep(pause).await;
        session.reset_round_cooldown();
        Some(pause)
    }

    async fn sleep_in(&self, range: DurationRange) -> Duration {
        if !self.enabled() {
            return Duration::ZERO;
        }
        let pause = range.sample();
        engine_debug!("pause {}ms", pause.as_millis());
        tokio::time::sleep(pause).await;
        pause
    }
}
