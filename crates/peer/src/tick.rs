use std::time::Duration;

/// Accumulates wall-clock time and releases it in fixed steps.
pub struct FixedTimestep {
    dt: Duration,
    accumulator: Duration,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            dt: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            accumulator: Duration::ZERO,
        }
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    /// Adds elapsed time, clamped so a long stall does not replay seconds of ticks.
    pub fn accumulate(&mut self, delta: Duration) {
        self.accumulator += delta.min(Duration::from_millis(250));
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_timestep_releases_whole_ticks() {
        let mut timestep = FixedTimestep::new(50);
        timestep.accumulate(Duration::from_millis(45));

        assert!(timestep.consume_tick());
        assert!(timestep.consume_tick());
        assert!(!timestep.consume_tick());
    }

    #[test]
    fn test_fixed_timestep_clamps_stalls() {
        let mut timestep = FixedTimestep::new(100);
        timestep.accumulate(Duration::from_secs(5));

        let mut ticks = 0;
        while timestep.consume_tick() {
            ticks += 1;
        }
        assert_eq!(ticks, 25);
    }
}
