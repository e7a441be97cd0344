use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Pending-event bitset of one coroutine.
///
/// Bits `0..MAX_NUTS` mirror the pipe-nut array; the top two bits are the
/// reserved lifecycle events. Producers on any thread may raise bits; only
/// the owning coroutine's dispatcher extracts them.
#[derive(Debug)]
pub struct ActivityFlags(AtomicU32);

impl ActivityFlags {
    pub(crate) fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Raise `event`. Release-ordered, so writes made before the trigger are
    /// visible to the owner once it extracts the bit. Idempotent; event
    /// numbers outside the 32-bit window are ignored.
    pub fn trigger(&self, event: u8) {
        if event >= 32 {
            return;
        }
        self.0.fetch_or(1 << event, Ordering::Release);
    }

    /// Clear and return the highest pending event, or `None` when idle.
    /// Higher bit number means higher priority, which puts the lifecycle
    /// events ahead of all channel activity.
    ///
    /// Single consumer: only the owning coroutine extracts, so the
    /// load-then-clear pair cannot race with another taker.
    pub fn take_highest(&self) -> Option<u8> {
        let pending = self.0.load(Ordering::Acquire);
        if pending == 0 {
            return None;
        }
        let event = 31 - pending.leading_zeros() as u8;
        self.0.fetch_and(!(1u32 << event), Ordering::AcqRel);
        Some(event)
    }

    /// Current mask, without consuming anything.
    pub fn snapshot(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

/// Cloneable cross-thread handle onto one coroutine's activity bits.
///
/// Triggering through this handle is the only operation another thread may
/// perform against a scheduler's coroutines; everything else stays on the
/// owning thread.
#[derive(Clone, Debug)]
pub struct Signal {
    flags: Arc<ActivityFlags>,
}

impl Signal {
    pub(crate) fn new(flags: Arc<ActivityFlags>) -> Self {
        Self { flags }
    }

    pub fn trigger(&self, event: u8) {
        self.flags.trigger(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FINALIZE, INITIALIZE};

    #[test]
    fn take_highest_on_idle_mask_is_none() {
        let flags = ActivityFlags::new();
        assert_eq!(flags.take_highest(), None);
    }

    /// A single raised bit comes out once, then the mask reads idle again.
    #[test]
    fn take_highest_drains_one_bit_per_call() {
        let flags = ActivityFlags::new();
        flags.trigger(5);
        assert_eq!(flags.take_highest(), Some(5));
        assert_eq!(flags.take_highest(), None);
    }

    #[test]
    fn extraction_order_is_by_descending_bit_number() {
        let flags = ActivityFlags::new();
        flags.trigger(3);
        flags.trigger(12);
        flags.trigger(0);
        assert_eq!(flags.take_highest(), Some(12));
        assert_eq!(flags.take_highest(), Some(3));
        assert_eq!(flags.take_highest(), Some(0));
        assert_eq!(flags.take_highest(), None);
    }

    #[test]
    fn lifecycle_events_preempt_ordinary_work() {
        let flags = ActivityFlags::new();
        flags.trigger(29);
        flags.trigger(FINALIZE);
        flags.trigger(INITIALIZE);
        assert_eq!(flags.take_highest(), Some(INITIALIZE));
        assert_eq!(flags.take_highest(), Some(FINALIZE));
        assert_eq!(flags.take_highest(), Some(29));
    }

    #[test]
    fn trigger_is_idempotent() {
        let flags = ActivityFlags::new();
        flags.trigger(7);
        flags.trigger(7);
        assert_eq!(flags.take_highest(), Some(7));
        assert_eq!(flags.take_highest(), None);
    }

    #[test]
    fn undefined_event_numbers_are_ignored() {
        let flags = ActivityFlags::new();
        flags.trigger(32);
        flags.trigger(200);
        assert_eq!(flags.take_highest(), None);
    }

    #[test]
    fn trigger_crosses_threads() {
        let flags = Arc::new(ActivityFlags::new());
        let signal = Signal::new(flags.clone());
        let handle = std::thread::spawn(move || signal.trigger(9));
        handle.join().unwrap();
        assert_eq!(flags.take_highest(), Some(9));
    }
}
