use std::time::Duration;

/// What the supervisor should do with a unit that just exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// The run was long enough to count as stable; respawn immediately and
    /// reset the crash-loop counter.
    RestartNow,
    /// The unit died too quickly; respawn after a back-off delay.
    RestartAfterDelay(Duration),
    /// Restart budget exhausted; leave the unit down.
    GiveUp,
}

/// Exponential back-off curve: `base * multiplier^attempt`, capped at
/// `max_delay`, with optional jitter.
#[derive(Debug, Clone)]
pub struct BackoffCurve {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl Default for BackoffCurve {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl BackoffCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before restart attempt number `attempt` (0-based).
    ///
    /// With jitter_factor 0 the result is monotonically non-decreasing in
    /// `attempt`; jitter trades that for thundering-herd protection.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        if self.jitter_factor == 0.0 {
            return Duration::from_millis(delay_ms as u64);
        }

        let jitter_range = delay_ms * self.jitter_factor;
        use rand::Rng;
        let mut rng = rand::rng();
        let jitter = rng.random_range(-jitter_range..=jitter_range);
        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}

/// Crash-loop protection for one unit.
///
/// Pure decision logic; the supervisor owns the counter and applies the
/// increment/reset implied by the decision.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    max_restarts: u32,
    min_uptime: Duration,
    curve: BackoffCurve,
}

impl RestartPolicy {
    pub fn new(max_restarts: u32, min_uptime: Duration) -> Self {
        Self {
            max_restarts,
            min_uptime,
            curve: BackoffCurve::default(),
        }
    }

    pub fn with_curve(mut self, curve: BackoffCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    pub fn decide(&self, restart_count: u32, uptime: Duration) -> RestartDecision {
        if restart_count >= self.max_restarts {
            return RestartDecision::GiveUp;
        }
        if uptime >= self.min_uptime {
            return RestartDecision::RestartNow;
        }
        RestartDecision::RestartAfterDelay(self.curve.delay_for(restart_count))
    }
}
