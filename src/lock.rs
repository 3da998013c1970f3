use std::time::Duration;

use web_time::Instant;

pub const DEFAULT_FAILSAFE_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of consulting the lock before accepting input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCheck {
    Free,
    Held,
    /// The lock outlived the failsafe and has been released.
    Expired(Duration),
}

/// Guards against overlapping input while a transaction is in flight.
#[derive(Debug, Clone)]
pub struct AnimationLock {
    acquired_at: Option<Instant>,
    timeout: Duration,
}

impl AnimationLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            acquired_at: None,
            timeout,
        }
    }

    /// (Re)starts the lock at `now`.
    pub fn acquire(&mut self, now: Instant) {
        self.acquired_at = Some(now);
    }

    pub fn release(&mut self) {
        self.acquired_at = None;
    }

    pub fn is_held(&self) -> bool {
        self.acquired_at.is_some()
    }

    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.acquired_at
            .map(|start| now.saturating_duration_since(start))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Releases a lock held longer than the timeout.
    pub fn check(&mut self, now: Instant) -> LockCheck {
        match self.age(now) {
            None => LockCheck::Free,
            Some(age) if age > self.timeout => {
                self.release();
                LockCheck::Expired(age)
            }
            Some(_) => LockCheck::Held,
        }
    }
}

impl Default for AnimationLock {
    fn default() -> Self {
        Self::new(DEFAULT_FAILSAFE_TIMEOUT)
    }
}
