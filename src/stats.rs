use ringbuffer::{AllocRingBuffer, RingBuffer};

use crate::sim::StepOutcome;

/// Running numbers for a playback session.
pub struct PlaybackStats {
    /// Ticks survived since the last crash.
    pub distance: u64,
    pub best_distance: u64,
    pub crashes: u64,
    pub ticks: u64,
    report_every: u64,
    rewards: AllocRingBuffer<i32>,
}

impl PlaybackStats {
    /// `reward_window` of zero is bumped to one.
    pub fn new(report_every: u64, reward_window: usize) -> Self {
        Self {
            distance: 0,
            best_distance: 0,
            crashes: 0,
            ticks: 0,
            report_every,
            rewards: AllocRingBuffer::new(reward_window.max(1)),
        }
    }

    pub fn set_report_every(&mut self, report_every: u64) {
        self.report_every = report_every;
    }

    /// Records one step. Returns the current distance when it is time to report it.
    pub fn record(&mut self, outcome: &StepOutcome) -> Option<u64> {
        self.ticks += 1;
        self.rewards.push(outcome.reward);
        if outcome.crashed {
            log::debug!("Crashed after {} frames", self.distance);
            self.crashes += 1;
            self.best_distance = self.best_distance.max(self.distance);
            self.distance = 0;
            return None;
        }
        self.distance += 1;
        self.best_distance = self.best_distance.max(self.distance);
        if self.report_every > 0 && self.distance % self.report_every == 0 {
            Some(self.distance)
        } else {
            None
        }
    }

    /// Mean reward over the most recent window.
    pub fn mean_reward(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().map(|&r| r as f32).sum::<f32>() / self.rewards.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonar::{ARM_COUNT, CLEAR};

    fn outcome(reward: i32, crashed: bool) -> StepOutcome {
        StepOutcome {
            reward,
            state: [0.95; ARM_COUNT],
            readings: [CLEAR; ARM_COUNT],
            crashed,
        }
    }

    #[test]
    fn reports_on_the_configured_cadence() {
        let mut stats = PlaybackStats::new(3, 8);
        let reports: Vec<_> = (0..7).map(|_| stats.record(&outcome(-100, false))).collect();
        assert_eq!(reports, vec![None, None, Some(3), None, None, Some(6), None]);
    }

    #[test]
    fn crash_resets_distance_but_keeps_best() {
        let mut stats = PlaybackStats::new(1000, 8);
        for _ in 0..5 {
            stats.record(&outcome(-100, false));
        }
        stats.record(&outcome(-500, true));
        stats.record(&outcome(-100, false));
        assert_eq!(stats.distance, 1);
        assert_eq!(stats.best_distance, 5);
        assert_eq!(stats.crashes, 1);
        assert_eq!(stats.ticks, 7);
    }

    #[test]
    fn mean_reward_uses_the_latest_window() {
        let mut stats = PlaybackStats::new(0, 2);
        assert_eq!(stats.mean_reward(), 0.0);
        stats.record(&outcome(-500, true));
        stats.record(&outcome(-100, false));
        stats.record(&outcome(-90, false));
        assert_eq!(stats.mean_reward(), -95.0);
    }
}
