use thiserror::Error;
use uuid::Uuid;

// ─── Scalar aliases ───────────────────────────────────────────

/// Identity of a spawned coroutine record.
pub type CoroId = Uuid;

/// Client-chosen resumption point inside a coroutine body.
pub type Label = u32;

// ─── Events ───────────────────────────────────────────────────

/// Reserved lifecycle event: external initialisation request. Highest
/// priority bit of the activity mask.
pub const INITIALIZE: u8 = 31;

/// Reserved lifecycle event: external finalisation request. Second highest
/// bit; the conventional cancellation signal.
pub const FINALIZE: u8 = 30;

/// Ordinary events (and therefore pipe nuts) occupy bits `0..MAX_NUTS`.
pub const MAX_NUTS: usize = 30;

// ─── Addressing ───────────────────────────────────────────────

/// Address of one pipe nut: a coroutine plus the nut's index in its array.
///
/// Activity bit `nut` of the owning coroutine corresponds to this endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipeId {
    pub coro: CoroId,
    pub nut: u8,
}

impl PipeId {
    pub fn new(coro: CoroId, nut: u8) -> Self {
        Self { coro, nut }
    }
}

// ─── Channel vocabulary ───────────────────────────────────────

/// Transfer role of a pipe nut for the current round. Exclusive: a nut is
/// never both reader and writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    None,
    Reader,
    Writer,
}

/// Channel-level failures, surfaced to application code through `sync`.
///
/// Blocking is an outcome, not an error, so there is no would-block variant
/// here; see [`SyncOutcome`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Graceful end of stream. Latched on both ends; a fresh round reads it
    /// as a zero-length delivery.
    #[error("end of stream")]
    Eof,
    /// Role collision, or a stream that ended short of the requested
    /// minimum.
    #[error("protocol violation")]
    Protocol,
    /// The peer coroutine was destroyed while paired. The receiver's peer
    /// link is cleared on delivery.
    #[error("connection reset by peer")]
    ConnReset,
}

/// Result of a single `sync` step on a pipe nut.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Cumulative bytes moved this round. `0` on a fresh round is the
    /// end-of-stream mark.
    Delivered(usize),
    /// The peer is not ready, or the requested minimum is unmet. Yield and
    /// retry.
    WouldBlock,
}

/// Result of a connection attempt on a pipe nut.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Both endpoints now point at each other.
    Paired,
    /// The request is queued (or the queue was empty); yield and retry.
    Pending,
}

/// Observable lifecycle phase of a pipe nut, derived from its fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Connected,
    Ready,
    Syncing,
    Complete,
    Eof,
    Error,
}

// ─── Coroutine control ────────────────────────────────────────

/// Where a coroutine continues on its next step.
///
/// `Init`, `Sweep` and `Terminated` are runtime sentinels; `Label` positions
/// belong to the body, and `Event`/`Cleanup` carry the dispatcher's routing
/// decision into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePoint {
    /// First entry; the body runs its prologue.
    Init,
    /// The per-coroutine event dispatcher.
    EventLoop,
    /// A body-defined position stored at the last yield.
    Label(Label),
    /// Entry into the handler for one routed event.
    Event(u8),
    /// Entry into the cleanup block of one resource.
    Cleanup(u8),
    /// The termination sweep over open resources.
    Sweep,
    /// Parked until `target` has terminated, then continue at `then`.
    Await { target: CoroId, then: Label },
    /// Terminal state; `resume` reports it consistently from here on.
    Terminated,
}

/// Verdict returned by one body step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Store the label and return control to the scheduler.
    Yield(Label),
    /// Enter the event dispatcher.
    EventLoop,
    /// Request termination; the runtime runs the cleanup sweep first.
    Done,
    /// Run `resource`'s cleanup block if it is open, then continue at
    /// `then`.
    Cleanup { resource: u8, then: Label },
    /// A cleanup block finished; the runtime clears the bit and transfers
    /// to the stored return point.
    CleanupDone,
    /// Park until `target` has terminated, then continue at `then`.
    Await { target: CoroId, then: Label },
}

/// Coarse outcome of `resume`. Fine-grained readiness travels in activity
/// bits, not return codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    MoreWork,
    Terminated,
}

/// Static description of a coroutine class, consulted by `spawn`.
#[derive(Debug)]
pub struct CoroClass {
    pub name: &'static str,
    /// Number of pipe nuts in each instance's array.
    pub nuts: u8,
    /// Mask of events the body declares handlers for. Pending events outside
    /// the mask are drained silently by the dispatcher.
    pub handled: u32,
}
