#![forbid(unsafe_code)]

//! Self-suspending periodic timers for DRE decay and feedback-table aging.
//!
//! The engine only keeps deadlines; the switch owning it runs the actual steps. A timer is
//! armed by packet arrival when idle, re-armed one period later after each step that
//! leaves live state behind, and left unarmed once the step reports everything is at
//! baseline. An idle switch therefore has no pending deadline at all.

use std::time::{Duration, Instant};

/// Which periodic step is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// DRE multiplicative decay, every `tdre`.
    Decay,
    /// Feedback/flowlet staleness sweep, every `aging_time / 4`.
    Aging,
}

#[derive(Debug, Clone)]
pub struct AgingEngine {
    decay_period: Duration,
    aging_period: Duration,
    aging_enabled: bool,
    decay_deadline: Option<Instant>,
    aging_deadline: Option<Instant>,
}

impl AgingEngine {
    pub fn new(decay_period: Duration, aging_time: Duration) -> Self {
        let min = Duration::from_nanos(1);
        Self {
            decay_period: decay_period.max(min),
            aging_period: (aging_time / 4).max(min),
            aging_enabled: true,
            decay_deadline: None,
            aging_deadline: None,
        }
    }

    /// Engine that only runs DRE decay; spines keep no feedback tables to age.
    pub fn decay_only(decay_period: Duration) -> Self {
        let mut engine = Self::new(decay_period, Duration::ZERO);
        engine.aging_enabled = false;
        engine
    }

    pub fn period(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::Decay => self.decay_period,
            TimerKind::Aging => self.aging_period,
        }
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        match kind {
            TimerKind::Decay => self.decay_deadline,
            TimerKind::Aging => self.aging_deadline,
        }
    }

    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.deadline(kind).is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.decay_deadline.is_none() && self.aging_deadline.is_none()
    }

    /// Start whichever timers are idle, one period after `now`.
    ///
    /// Returns `true` if at least one timer was newly armed.
    pub fn arm(&mut self, now: Instant) -> bool {
        let mut armed = false;
        if self.decay_deadline.is_none() {
            tracing::trace!("restarting dre decay timer");
            self.decay_deadline = Some(now + self.decay_period);
            armed = true;
        }
        if self.aging_enabled && self.aging_deadline.is_none() {
            tracing::trace!("restarting aging timer");
            self.aging_deadline = Some(now + self.aging_period);
            armed = true;
        }
        armed
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.decay_deadline, self.aging_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take the earliest timer due at `now`, leaving it unarmed.
    ///
    /// Returns the timer and the instant it was scheduled for; the caller runs the step
    /// as of that instant and then calls [`rearm`](Self::rearm).
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerKind, Instant)> {
        let due = |d: Option<Instant>| d.filter(|at| *at <= now);
        let (kind, at) = match (due(self.decay_deadline), due(self.aging_deadline)) {
            (Some(d), Some(a)) if a < d => (TimerKind::Aging, a),
            (Some(d), _) => (TimerKind::Decay, d),
            (None, Some(a)) => (TimerKind::Aging, a),
            (None, None) => return None,
        };
        match kind {
            TimerKind::Decay => self.decay_deadline = None,
            TimerKind::Aging => self.aging_deadline = None,
        }
        Some((kind, at))
    }

    /// Schedule the next run of `kind` one period after `fired_at` if `live`, otherwise
    /// leave it idle until the next packet arms it.
    pub fn rearm(&mut self, kind: TimerKind, fired_at: Instant, live: bool) {
        let next = if live {
            Some(fired_at + self.period(kind))
        } else {
            tracing::trace!(?kind, "timer goes idle");
            None
        };
        match kind {
            TimerKind::Decay => self.decay_deadline = next,
            TimerKind::Aging => self.aging_deadline = next,
        }
    }

    /// Drop both deadlines. Used on shutdown.
    pub fn cancel(&mut self) {
        self.decay_deadline = None;
        self.aging_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AgingEngine {
        AgingEngine::new(Duration::from_micros(200), Duration::from_millis(10))
    }

    #[test]
    fn starts_idle() {
        let e = engine();
        assert!(e.is_idle());
        assert_eq!(e.next_deadline(), None);
        assert_eq!(e.period(TimerKind::Aging), Duration::from_micros(2500));
    }

    #[test]
    fn arm_is_idempotent_while_running() {
        let mut e = engine();
        let t0 = Instant::now();
        assert!(e.arm(t0));
        assert!(!e.arm(t0 + Duration::from_micros(100)));
        assert_eq!(e.next_deadline(), Some(t0 + Duration::from_micros(200)));
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut e = engine();
        let t0 = Instant::now();
        e.arm(t0);
        assert_eq!(e.pop_due(t0 + Duration::from_micros(100)), None);
        let late = t0 + Duration::from_millis(3);
        assert_eq!(e.pop_due(late), Some((TimerKind::Decay, t0 + Duration::from_micros(200))));
        assert_eq!(e.pop_due(late), Some((TimerKind::Aging, t0 + Duration::from_micros(2500))));
        assert_eq!(e.pop_due(late), None);
        assert!(e.is_idle());
    }

    #[test]
    fn rearm_only_when_live() {
        let mut e = engine();
        let t0 = Instant::now();
        e.arm(t0);
        let (kind, at) = e.pop_due(t0 + Duration::from_micros(200)).unwrap();
        e.rearm(kind, at, true);
        assert_eq!(e.deadline(TimerKind::Decay), Some(at + Duration::from_micros(200)));
        let (kind, at) = e.pop_due(t0 + Duration::from_micros(400)).unwrap();
        e.rearm(kind, at, false);
        assert!(!e.is_running(TimerKind::Decay));
        assert!(e.is_running(TimerKind::Aging));
    }

    #[test]
    fn decay_only_never_arms_aging() {
        let mut e = AgingEngine::decay_only(Duration::from_micros(200));
        let t0 = Instant::now();
        assert!(e.arm(t0));
        assert!(e.is_running(TimerKind::Decay));
        assert!(!e.is_running(TimerKind::Aging));
    }

    #[test]
    fn cancel_clears_everything() {
        let mut e = engine();
        e.arm(Instant::now());
        e.cancel();
        assert!(e.is_idle());
    }
}
