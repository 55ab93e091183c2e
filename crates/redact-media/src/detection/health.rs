//! Consecutive-failure tracking for detector backends.
//!
//! A detector that fails on a frame is tolerated: the frame yields no
//! detections and the failure is counted. Once failures run unbroken past
//! the configured limit the detector is considered unavailable.

/// Health of one detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    /// Last call succeeded
    Healthy,
    /// Failing, still under the limit
    Degraded { consecutive: u32 },
    /// Limit reached; further frames must not be trusted to this detector
    Unavailable { consecutive: u32 },
}

/// Failure counter for a single detector.
#[derive(Clone, Debug)]
pub struct DetectorHealth {
    max_consecutive_failures: u32,
    consecutive: u32,
    total_failures: u64,
}

impl DetectorHealth {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive: 0,
            total_failures: 0,
        }
    }

    /// Record a successful call.
    pub fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failed call and return the resulting state.
    pub fn failure(&mut self) -> HealthState {
        self.consecutive += 1;
        self.total_failures += 1;
        self.state()
    }

    pub fn state(&self) -> HealthState {
        match self.consecutive {
            0 => HealthState::Healthy,
            n if n >= self.max_consecutive_failures => HealthState::Unavailable { consecutive: n },
            n => HealthState::Degraded { consecutive: n },
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Forget all history, for a new run.
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.total_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_after_limit() {
        let mut health = DetectorHealth::new(3);
        assert_eq!(health.failure(), HealthState::Degraded { consecutive: 1 });
        assert_eq!(health.failure(), HealthState::Degraded { consecutive: 2 });
        assert_eq!(health.failure(), HealthState::Unavailable { consecutive: 3 });
    }

    #[test]
    fn test_success_resets_streak() {
        let mut health = DetectorHealth::new(2);
        health.failure();
        health.success();
        assert_eq!(health.state(), HealthState::Healthy);
        assert_eq!(health.failure(), HealthState::Degraded { consecutive: 1 });
        assert_eq!(health.total_failures(), 2);
    }
}
