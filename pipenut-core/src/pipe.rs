use std::collections::VecDeque;

use crate::types::{ChannelError, PipeId, Phase, Role};

/// One endpoint of a synchronous byte channel, owned by a single coroutine
/// at a fixed index in its pipe-nut array.
///
/// A round of communication installs a buffer window on each side, moves
/// bytes writer-to-reader through `sync`, and ends in `Complete`, `Eof` or
/// `Error`; `reset_buffer` opens the next round. Errors are latched equally
/// on both ends so each side delivers them locally.
#[derive(Debug)]
pub struct PipeNut {
    /// The endpoint this nut is (or wants to be) paired with. Half-connected
    /// while our connection request sits in the peer's queue.
    pub(crate) peer: Option<PipeId>,
    /// Buffer window for the current round; empty until `setup_buffer`.
    pub(crate) buf: Vec<u8>,
    /// Window size. Derived from the installed buffer; a writer pushing EOF
    /// clamps it to the current offset to close the round.
    pub(crate) max: usize,
    /// Bytes transferred so far this round, `0 <= ofs <= max`.
    pub(crate) ofs: usize,
    /// Absolute report threshold for the round. `max + 1` after a reset so
    /// that no stale wake can complete the round before the caller asks.
    pub(crate) min: usize,
    /// Bytes already handed to the caller this round. Each `sync(minlen)`
    /// requires `minlen` new bytes beyond this watermark.
    pub(crate) reported: usize,
    pub(crate) role: Role,
    /// Latched local status; `Eof` is sticky, hard errors clear on delivery.
    pub(crate) err: Option<ChannelError>,
    /// One role-collision report per reset.
    pub(crate) fault_latched: bool,
    /// Endpoints queued up for a connection to this one. FIFO.
    pub(crate) queue: VecDeque<PipeId>,
}

impl PipeNut {
    pub(crate) fn new() -> Self {
        Self {
            peer: None,
            buf: Vec::new(),
            max: 0,
            ofs: 0,
            min: 0,
            reported: 0,
            role: Role::None,
            err: None,
            fault_latched: false,
            queue: VecDeque::new(),
        }
    }

    /// The observable phase, derived from the stored fields:
    /// no buffer and no peer is `Initial`; no buffer with a peer is
    /// `Connected`; with a buffer, a latched status wins (`Eof`/`Error`),
    /// then a full window is `Complete`, an armed minimum is `Syncing`, and
    /// anything else is `Ready`.
    pub fn phase(&self) -> Phase {
        match self.err {
            Some(ChannelError::Eof) => Phase::Eof,
            Some(_) => Phase::Error,
            None if self.buf.is_empty() => {
                if self.peer.is_some() {
                    Phase::Connected
                } else {
                    Phase::Initial
                }
            }
            None if self.ofs == self.max => Phase::Complete,
            None if self.min <= self.max => Phase::Syncing,
            None => Phase::Ready,
        }
    }

    /// The bytes moved so far this round. For a reader this is the delivered
    /// payload view.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.ofs]
    }

    pub fn peer(&self) -> Option<PipeId> {
        self.peer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn err(&self) -> Option<ChannelError> {
        self.err
    }

    pub fn offset(&self) -> usize {
        self.ofs
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn minimum(&self) -> usize {
        self.min
    }

    /// Connection requests currently waiting on this endpoint.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn with_window(max: usize) -> PipeNut {
        let mut nut = PipeNut::new();
        nut.peer = Some(PipeId::new(Uuid::now_v7(), 0));
        nut.buf = vec![0; max];
        nut.max = max;
        nut.min = max + 1;
        nut.role = Role::Reader;
        nut
    }

    #[test]
    fn phase_tracks_connection_and_round_state() {
        let mut nut = PipeNut::new();
        assert_eq!(nut.phase(), Phase::Initial);

        nut.peer = Some(PipeId::new(Uuid::now_v7(), 1));
        assert_eq!(nut.phase(), Phase::Connected);

        let mut nut = with_window(4);
        assert_eq!(nut.phase(), Phase::Ready);

        nut.min = 2;
        assert_eq!(nut.phase(), Phase::Syncing);

        nut.ofs = 4;
        assert_eq!(nut.phase(), Phase::Complete);

        nut.err = Some(ChannelError::Eof);
        assert_eq!(nut.phase(), Phase::Eof);

        nut.err = Some(ChannelError::Protocol);
        assert_eq!(nut.phase(), Phase::Error);
    }

    #[test]
    fn bytes_exposes_the_transferred_prefix() {
        let mut nut = with_window(4);
        nut.buf = vec![10, 20, 30, 40];
        nut.ofs = 2;
        assert_eq!(nut.bytes(), &[10, 20]);
    }
}
