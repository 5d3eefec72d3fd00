//! Elapsed-time display bound to a single run.

use std::time::{Duration, Instant};

/// Identifies one run; events tagged with an older token are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunToken(pub u64);

impl std::fmt::Display for RunToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Label prefix shown before the `MM:SS` value.
pub const LABEL_PREFIX: &str = "Time Elapsed: ";

/// Whole-second interval timer armed for exactly one run at a time.
///
/// `stop` only disarms the timer for the token that armed it, so a late
/// event from an earlier run cannot stop the current one.
#[derive(Debug, Clone, Default)]
pub struct ElapsedTimer {
    armed: Option<(RunToken, Instant)>,
    elapsed_secs: u64,
}

impl ElapsedTimer {
    pub const INTERVAL: Duration = Duration::from_secs(1);

    pub fn start(&mut self, token: RunToken, now: Instant) {
        self.armed = Some((token, now));
        self.elapsed_secs = 0;
    }

    /// Disarm if `token` armed the timer. The last displayed value is kept.
    pub fn stop(&mut self, token: RunToken) -> bool {
        match self.armed {
            Some((armed, _)) if armed == token => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.armed.is_some()
    }

    /// Recompute elapsed whole seconds. Returns `true` when the value changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some((_, started)) = self.armed else {
            return false;
        };
        let secs = now.saturating_duration_since(started).as_secs();
        if secs == self.elapsed_secs {
            return false;
        }
        self.elapsed_secs = secs;
        true
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn label(&self) -> String {
        format!("{LABEL_PREFIX}{}", format_elapsed(self.elapsed_secs))
    }

    /// Time until the next whole-second boundary, or `None` when stopped.
    pub fn until_next_tick(&self, now: Instant) -> Option<Duration> {
        let (_, started) = self.armed?;
        let since = now.saturating_duration_since(started);
        let into_second = Duration::from_nanos(u64::from(since.subsec_nanos()));
        Some(Self::INTERVAL.saturating_sub(into_second))
    }
}

/// Format whole seconds as `MM:SS`; minutes keep growing past 99.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
