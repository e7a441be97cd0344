use std::sync::Arc;

use crate::activity::{ActivityFlags, Signal};
use crate::pipe::PipeNut;
use crate::sched::Runtime;
use crate::types::*;

/// One coroutine body: an explicit state machine entered at the record's
/// current resume point.
///
/// A body never blocks. It runs until it can make no further progress in
/// this activation, then returns a [`Step`] verdict telling the runtime
/// where to continue. Raising to a handler inside one activation is plain
/// control flow; raising across activations goes through the returned
/// label.
pub trait CoroBody {
    fn step(&mut self, cx: &mut Context<'_>) -> Step;
}

/// A coroutine record: the scheduling header plus the pipe-nut array.
///
/// The boxed body is taken out while stepping so the record itself stays
/// addressable through the runtime for the channel operations the step
/// performs.
pub(crate) struct Coro {
    pub(crate) id: CoroId,
    pub(crate) class: &'static CoroClass,
    pub(crate) resume: ResumePoint,
    /// Where control goes when a cleanup block finishes.
    pub(crate) cleanup_return: ResumePoint,
    /// Bit r set iff resource r is currently held.
    pub(crate) open_resources: u32,
    pub(crate) activity: Arc<ActivityFlags>,
    pub(crate) pipes: Vec<PipeNut>,
    pub(crate) body: Option<Box<dyn CoroBody>>,
    /// Drop the record as soon as `resume` reports termination.
    pub(crate) reap_on_exit: bool,
}

/// Execution context handed to a body step.
///
/// Channel operations here are addressed by the local nut index; the
/// [`Runtime`] carries the same operations addressed by full [`PipeId`] for
/// factories and tests.
pub struct Context<'a> {
    pub(crate) rt: &'a mut Runtime,
    pub(crate) id: CoroId,
    pub(crate) point: ResumePoint,
}

impl Context<'_> {
    /// The resume point this activation was entered at.
    pub fn point(&self) -> ResumePoint {
        self.point
    }

    pub fn id(&self) -> CoroId {
        self.id
    }

    /// Full address of one of this coroutine's own pipe nuts.
    pub fn nut(&self, nut: u8) -> PipeId {
        PipeId::new(self.id, nut)
    }

    // ── Channels ──

    pub fn sync(&mut self, nut: u8, minlen: usize) -> Result<SyncOutcome, ChannelError> {
        self.rt.sync(self.nut(nut), minlen)
    }

    pub fn setup_buffer(&mut self, nut: u8, role: Role, buf: Vec<u8>) {
        self.rt.setup_buffer(self.nut(nut), role, buf);
    }

    pub fn reset_buffer(&mut self, nut: u8, role: Role) {
        self.rt.reset_buffer(self.nut(nut), role);
    }

    pub fn push_eof(&mut self, nut: u8) {
        self.rt.push_eof(self.nut(nut));
    }

    pub fn pull_eof(&mut self, nut: u8) {
        self.rt.pull_eof(self.nut(nut));
    }

    pub fn error(&mut self, nut: u8, code: ChannelError) {
        self.rt.error(self.nut(nut), code);
    }

    pub fn connect(&mut self, nut: u8, other: PipeId) -> ConnectOutcome {
        self.rt.connect(self.nut(nut), other)
    }

    pub fn accept(&mut self, nut: u8) -> ConnectOutcome {
        self.rt.accept(self.nut(nut))
    }

    /// Factory pairing of one of our nuts with a freshly spawned peer's.
    pub fn make_pipe(&mut self, nut: u8, other: PipeId) {
        self.rt.make_pipe(self.nut(nut), other);
    }

    /// Delivered payload view of one of our nuts.
    pub fn bytes(&self, nut: u8) -> &[u8] {
        self.rt.nut(self.nut(nut)).bytes()
    }

    // ── Lifecycle and events ──

    pub fn spawn(&mut self, class: &'static CoroClass, body: Box<dyn CoroBody>) -> CoroId {
        self.rt.spawn(class, body)
    }

    pub fn signal(&self, target: CoroId) -> Option<Signal> {
        self.rt.signal(target)
    }

    pub fn trigger(&self, event: u8, target: CoroId) {
        self.rt.trigger(event, target);
    }

    /// Ask the scheduler to drop this record once it terminates.
    pub fn reap_on_exit(&mut self) {
        self.rt.coro_mut(self.id).reap_on_exit = true;
    }

    // ── Resources ──

    pub fn mark_open(&mut self, resource: u8) {
        assert!(resource < 32, "resource index out of range");
        self.rt.coro_mut(self.id).open_resources |= 1 << resource;
    }

    pub fn mark_closed(&mut self, resource: u8) {
        assert!(resource < 32, "resource index out of range");
        self.rt.coro_mut(self.id).open_resources &= !(1 << resource);
    }

    pub fn is_open(&self, resource: u8) -> bool {
        assert!(resource < 32, "resource index out of range");
        self.rt.coro(self.id).open_resources & (1 << resource) != 0
    }

    pub fn open_resources(&self) -> u32 {
        self.rt.coro(self.id).open_resources
    }
}
