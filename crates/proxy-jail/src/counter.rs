//! Per-address error counting and ban escalation.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::ForgivablePolicy;

/// Token bucket that regains one token per interval.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Current tokens available.
    tokens: f64,
    /// Maximum tokens (burst size).
    capacity: f64,
    /// Time to regain one token. Zero means unlimited.
    refill_every: Duration,
    /// Last time tokens were refilled.
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a new, full token bucket.
    fn new(capacity: u32, refill_every: Duration, now: Instant) -> Self {
        let capacity = f64::from(capacity);
        Self {
            tokens: capacity,
            capacity,
            refill_every,
            last_refill: now,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        if self.refill_every.is_zero() {
            self.tokens = self.capacity;
        } else {
            let elapsed = now.saturating_duration_since(self.last_refill);
            let regained = elapsed.as_secs_f64() / self.refill_every.as_secs_f64();
            self.tokens = (self.tokens + regained).min(self.capacity);
        }

        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Try to take one token. Returns true if successful.
    fn try_acquire(&mut self, now: Instant) -> bool {
        if self.refill_every.is_zero() {
            return true;
        }

        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whether the bucket has fully refilled.
    fn is_full(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= self.capacity
    }
}

/// What recording an error did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountOutcome {
    /// The address is already banned; nothing changed.
    AlreadyBanned {
        /// The reason that was not recorded.
        reason: String,
    },
    /// The error was forgiven.
    Counted {
        /// The reason that was buffered.
        reason: String,
    },
    /// The burst was exceeded and the address is now banned.
    Escalated {
        /// Buffered reasons, oldest first.
        reasons: Vec<String>,
    },
}

/// Error state for one address.
///
/// Lives in one of three states: counting (not banned), banned (until a
/// point in time), or absent from the table altogether.
#[derive(Debug, Clone)]
pub struct ErrorCounter {
    limiter: TokenBucket,
    reasons: VecDeque<String>,
    max_reasons: usize,
    ban_duration: Duration,
    banned_until: Option<Instant>,
}

impl ErrorCounter {
    /// Create a counter with a full bucket.
    #[must_use]
    pub fn new(policy: &ForgivablePolicy, now: Instant) -> Self {
        let max_reasons = policy.max_count as usize;
        Self {
            limiter: TokenBucket::new(policy.max_count, policy.window, now),
            reasons: VecDeque::with_capacity(max_reasons + 1),
            max_reasons,
            ban_duration: policy.ban_duration(),
            banned_until: None,
        }
    }

    /// Records one error.
    ///
    /// While banned this is a no-op and the reason is handed back in the
    /// outcome. Otherwise the reason is buffered (the
    /// buffer never holds more than `max_count` reasons) and the limiter is
    /// consulted; a denial bans the address and drains the buffer.
    pub fn record(&mut self, reason: String, now: Instant) -> CountOutcome {
        if self.is_banned(now) {
            return CountOutcome::AlreadyBanned { reason };
        }

        if self.limiter.try_acquire(now) {
            self.buffer(reason.clone());
            return CountOutcome::Counted { reason };
        }

        self.buffer(reason);
        self.banned_until = Some(now + self.ban_duration);
        CountOutcome::Escalated {
            reasons: self.reasons.drain(..).collect(),
        }
    }

    fn buffer(&mut self, reason: String) {
        self.reasons.push_back(reason);
        while self.reasons.len() > self.max_reasons {
            self.reasons.pop_front();
        }
    }

    /// Whether a ban is active at `now`.
    #[must_use]
    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    /// When the current or last ban ends.
    #[must_use]
    pub const fn banned_until(&self) -> Option<Instant> {
        self.banned_until
    }

    /// Number of buffered reasons.
    #[must_use]
    pub fn pending_reasons(&self) -> usize {
        self.reasons.len()
    }

    /// Whether this counter is indistinguishable from a fresh one for
    /// escalation purposes: not banned and fully refilled.
    pub fn is_idle(&mut self, now: Instant) -> bool {
        !self.is_banned(now) && self.limiter.is_full(now)
    }
}
