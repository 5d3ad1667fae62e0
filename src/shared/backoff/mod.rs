//! Bounded retry pacing.
//

use std::hint;
use std::thread;
use std::time::Duration;

/// Paces one bounded retry loop.
pub trait Backoff {
    /// Waits before retry `attempt` (0-based). Returns false once the loop
    /// should give up.
    fn pause(&mut self, attempt: u32) -> bool;
}

/// Spins for the first attempts, then sleeps with a doubling delay.
#[derive(Debug, Clone, Copy)]
pub struct SpinThenSleep {
    pub spins: u32,
    pub base: Duration,
    pub max: Duration,
    pub attempts: u32,
}

impl Default for SpinThenSleep {
    fn default() -> Self {
        Self {
            spins: 16,
            base: Duration::from_micros(10),
            max: Duration::from_millis(10),
            attempts: 1000,
        }
    }
}

impl Backoff for SpinThenSleep {
    fn pause(&mut self, attempt: u32) -> bool {
        if attempt >= self.attempts {
            return false;
        }
        if attempt < self.spins {
            hint::spin_loop();
            return true;
        }
        let shift = (attempt - self.spins).min(16);
        let delay = self.base.saturating_mul(1 << shift).min(self.max);
        thread::sleep(delay);
        true
    }
}

/// Gives up after a fixed number of attempts without waiting; for tests.
#[derive(Debug, Clone, Copy)]
pub struct Immediate(pub u32);

impl Backoff for Immediate {
    fn pause(&mut self, attempt: u32) -> bool {
        attempt < self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spin_then_sleep_is_bounded() {
        let mut b = SpinThenSleep {
            spins: 2,
            base: Duration::from_micros(1),
            max: Duration::from_micros(5),
            attempts: 4,
        };
        assert!((0..4).all(|i| b.pause(i)));
        assert!(!b.pause(4));
    }

    #[test]
    fn test_immediate() {
        let mut b = Immediate(1);
        assert!(b.pause(0));
        assert!(!b.pause(1));
    }
}
