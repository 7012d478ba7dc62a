//! Attempt ledger: pure throttle decisions over a `ThrottleState`.
//!
//! Nothing here touches storage or the clock. Callers pass `now`, get back a
//! decision or the next state, and persist whatever changed.

use chrono::{DateTime, Duration, Utc};

use crate::models::throttle::{AccountLockout, LedgerSet, ThrottleState};

/// Which attempt trips the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Request budgets: the action that would be number `limit + 1` trips it.
    OnExcess,
    /// Failure budgets: the failure that uses up the last attempt trips it.
    OnExhaustion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub limit: u32,
    pub cooldown: Duration,
    pub block: Duration,
    pub escalation: Escalation,
}

impl ThrottlePolicy {
    /// Budget for actions the caller asks for (OTP sends), spaced by `cooldown`.
    pub fn requests(limit: u32, cooldown: Duration, block: Duration) -> Self {
        Self {
            limit,
            cooldown,
            block,
            escalation: Escalation::OnExcess,
        }
    }

    /// Budget for failed checks (wrong password, wrong code). No cooldown.
    pub fn failures(limit: u32, block: Duration) -> Self {
        Self {
            limit,
            cooldown: Duration::zero(),
            block,
            escalation: Escalation::OnExhaustion,
        }
    }

    fn trips(&self, count: u32) -> bool {
        match self.escalation {
            Escalation::OnExcess => count > self.limit,
            Escalation::OnExhaustion => count >= self.limit,
        }
    }
}

/// Result of `evaluate`. At most one of `retry_in_seconds` and
/// `block_remaining_seconds` is non-zero; a block always wins over a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub allowed: bool,
    pub retry_in_seconds: u64,
    pub attempts_left: u32,
    pub block_remaining_seconds: u64,
}

impl Evaluation {
    pub fn is_blocked(&self) -> bool {
        self.block_remaining_seconds > 0
    }

    pub fn is_cooling_down(&self) -> bool {
        !self.allowed && !self.is_blocked()
    }
}

/// Outcome of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Counted { attempts_left: u32 },
    Tripped { block_remaining_seconds: u64 },
}

/// Whole seconds until `deadline`, rounded up. Zero once it has passed.
pub fn seconds_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = deadline - now;
    if delta <= Duration::zero() {
        return 0;
    }
    let whole = delta.num_seconds();
    let secs = if delta > Duration::seconds(whole) {
        whole + 1
    } else {
        whole
    };
    secs.max(0) as u64
}

impl ThrottleState {
    /// State with an expired block observed: counters back to zero.
    pub fn refreshed(&self, now: DateTime<Utc>) -> ThrottleState {
        match self.blocked_until {
            Some(until) if until <= now => ThrottleState::default(),
            _ => self.clone(),
        }
    }

    pub fn evaluate(&self, policy: &ThrottlePolicy, now: DateTime<Utc>) -> Evaluation {
        let state = self.refreshed(now);

        if let Some(until) = state.blocked_until {
            return Evaluation {
                allowed: false,
                retry_in_seconds: 0,
                attempts_left: 0,
                block_remaining_seconds: seconds_until(until, now),
            };
        }

        let attempts_left = policy.limit.saturating_sub(state.attempt_count);

        if let Some(last) = state.last_action_at {
            if now - last < policy.cooldown {
                return Evaluation {
                    allowed: false,
                    retry_in_seconds: seconds_until(last + policy.cooldown, now),
                    attempts_left,
                    block_remaining_seconds: 0,
                };
            }
        }

        Evaluation {
            allowed: true,
            retry_in_seconds: 0,
            attempts_left,
            block_remaining_seconds: 0,
        }
    }

    pub fn record_attempt(&self, policy: &ThrottlePolicy, now: DateTime<Utc>) -> ThrottleState {
        let mut next = self.refreshed(now);

        // Counting stops while blocked.
        if next.blocked_until.is_none() {
            next.attempt_count = next.attempt_count.saturating_add(1);
            if policy.trips(next.attempt_count) {
                next.blocked_until = Some(now + policy.block);
            }
        }
        next.last_action_at = Some(now);
        next
    }

    pub fn record_success(&self) -> ThrottleState {
        ThrottleState::default()
    }
}

impl<L: LedgerSet> AccountLockout<L> {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    pub fn lock_remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.locked_until
            .map(|until| seconds_until(until, now))
            .unwrap_or(0)
    }

    /// Observe an expired gate: every ledger under it restarts from zero.
    /// Returns `true` when something changed and must be persisted.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        match self.locked_until {
            Some(until) if until <= now => {
                self.ledgers.reset_all();
                self.locked_until = None;
                true
            }
            _ => false,
        }
    }

    /// The member ledger as seen through the gate.
    fn gated(&self, key: L::Key) -> ThrottleState {
        ThrottleState {
            blocked_until: self.locked_until,
            ..self.ledgers.ledger(key).clone()
        }
    }

    pub fn evaluate(&self, key: L::Key, policy: &ThrottlePolicy, now: DateTime<Utc>) -> Evaluation {
        self.gated(key).evaluate(policy, now)
    }

    /// Count one attempt against `key`; tripping its limit closes the gate.
    pub fn record_attempt(
        &mut self,
        key: L::Key,
        policy: &ThrottlePolicy,
        now: DateTime<Utc>,
    ) -> Recorded {
        self.refresh(now);

        let next = self.gated(key).record_attempt(policy, now);
        self.locked_until = next.blocked_until;
        *self.ledgers.ledger_mut(key) = ThrottleState {
            blocked_until: None,
            ..next
        };

        if self.is_locked(now) {
            Recorded::Tripped {
                block_remaining_seconds: self.lock_remaining_seconds(now),
            }
        } else {
            Recorded::Counted {
                attempts_left: policy.limit.saturating_sub(self.ledgers.ledger(key).attempt_count),
            }
        }
    }

    /// Restart a single ledger, leaving the gate alone.
    pub fn reset(&mut self, key: L::Key) {
        let ledger = self.ledgers.ledger_mut(key);
        *ledger = ledger.record_success();
    }

    /// A successful authentication clears every ledger and the gate.
    pub fn record_success(&mut self) {
        self.ledgers.reset_all();
        self.locked_until = None;
    }
}
