//! Connection and transfer protocol between paired pipe nuts.
//!
//! All operations run on the scheduler thread that owns both records; the
//! only cross-thread effect is the activity trigger raised towards the
//! peer. Violated preconditions are programming errors and assert.

use crate::pipe::PipeNut;
use crate::sched::Runtime;
use crate::types::*;

impl Runtime {
    /// Immutable view of one pipe nut. Panics on an unknown address.
    pub fn nut(&self, p: PipeId) -> &PipeNut {
        self.coro(p.coro)
            .pipes
            .get(p.nut as usize)
            .expect("pipe nut index out of range")
    }

    pub(crate) fn nut_mut(&mut self, p: PipeId) -> &mut PipeNut {
        self.coro_mut(p.coro)
            .pipes
            .get_mut(p.nut as usize)
            .expect("pipe nut index out of range")
    }

    fn mutually_bound(&self, me: PipeId, peer: PipeId) -> bool {
        self.coros
            .get(&peer.coro)
            .and_then(|c| c.pipes.get(peer.nut as usize))
            .is_some_and(|n| n.peer == Some(me))
    }

    /// Latch PROTOCOL on both ends of a bound pair and wake the far side.
    fn fault_pair(&mut self, me: PipeId, peer: PipeId) {
        let mine = self.nut_mut(me);
        mine.err = Some(ChannelError::Protocol);
        mine.fault_latched = true;
        let theirs = self.nut_mut(peer);
        theirs.err = Some(ChannelError::Protocol);
        theirs.fault_latched = true;
        self.trigger(peer.nut, peer.coro);
    }

    // ── Connection protocol ──

    /// Pair two virgin endpoints directly, skipping the request queue.
    /// Factory use only: both must be initial with empty queues. No events
    /// are emitted.
    pub fn make_pipe(&mut self, a: PipeId, b: PipeId) {
        assert_ne!(a.coro, b.coro, "a pipe couples two distinct coroutines");
        for p in [a, b] {
            let nut = self.nut(p);
            assert!(
                nut.peer.is_none() && nut.buf.is_empty() && nut.queue.is_empty(),
                "make_pipe on a non-initial endpoint"
            );
        }
        self.nut_mut(a).peer = Some(b);
        self.nut_mut(b).peer = Some(a);
    }

    /// Request a connection to `other`.
    ///
    /// If `other` is already waiting in our own queue (the mirrored half of
    /// a symmetric connect) the pairing completes on the spot. Otherwise we
    /// become half-connected, line up in `other`'s queue, and wait to be
    /// accepted. The far coroutine is signalled either way.
    pub fn connect(&mut self, me: PipeId, other: PipeId) -> ConnectOutcome {
        assert_ne!(me.coro, other.coro, "a pipe couples two distinct coroutines");
        {
            let nut = self.nut(me);
            assert!(
                nut.peer.is_none() && nut.buf.is_empty(),
                "connect on a non-initial pipe nut"
            );
        }
        let mirrored = self.nut(me).queue.iter().position(|q| *q == other);
        if let Some(at) = mirrored {
            self.nut_mut(me).queue.remove(at);
            self.nut_mut(me).peer = Some(other);
            self.nut_mut(other).peer = Some(me);
            self.trigger(other.nut, other.coro);
            tracing::debug!(me = %me.coro, other = %other.coro, "symmetric connect paired");
            ConnectOutcome::Paired
        } else {
            self.nut_mut(me).peer = Some(other);
            self.nut_mut(other).queue.push_back(me);
            self.trigger(other.nut, other.coro);
            ConnectOutcome::Pending
        }
    }

    /// Accept the oldest queued connection request, if any.
    pub fn accept(&mut self, me: PipeId) -> ConnectOutcome {
        {
            let nut = self.nut(me);
            assert!(
                nut.peer.is_none() && nut.buf.is_empty(),
                "accept on a non-initial pipe nut"
            );
        }
        let Some(requester) = self.nut_mut(me).queue.pop_front() else {
            return ConnectOutcome::Pending;
        };
        self.nut_mut(me).peer = Some(requester);
        self.nut_mut(requester).peer = Some(me);
        self.trigger(requester.nut, requester.coro);
        ConnectOutcome::Paired
    }

    // ── Buffer rounds ──

    /// Install a window for the next round and take a role. A writer hands
    /// in its payload; a reader hands in the destination.
    pub fn setup_buffer(&mut self, p: PipeId, role: Role, buf: Vec<u8>) {
        assert!(role != Role::None, "setup_buffer requires a role");
        assert!(!buf.is_empty(), "setup_buffer requires a non-empty window");
        let nut = self.nut_mut(p);
        assert!(nut.peer.is_some(), "setup_buffer before a connection");
        nut.buf = buf;
        self.reset_buffer(p, role);
    }

    /// Open a fresh round over the installed window: offsets and status
    /// clear, and the report threshold moves out of reach until the caller
    /// syncs. Identical roles on a bound pair latch PROTOCOL on both ends.
    pub fn reset_buffer(&mut self, p: PipeId, role: Role) {
        assert!(role != Role::None, "reset_buffer requires a role");
        let nut = self.nut_mut(p);
        assert!(!nut.buf.is_empty(), "reset_buffer before setup_buffer");
        nut.role = role;
        nut.max = nut.buf.len();
        nut.ofs = 0;
        nut.reported = 0;
        nut.min = nut.max + 1;
        nut.err = None;
        nut.fault_latched = false;
        if let Some(peer_id) = nut.peer {
            if self.mutually_bound(p, peer_id) && self.nut(peer_id).role == role {
                self.fault_pair(p, peer_id);
            }
        }
    }

    // ── Transfer ──

    /// One transfer step: report any latched status, otherwise move as many
    /// bytes as both windows allow and wake the peer.
    ///
    /// `minlen` asks for that many new bytes beyond what earlier calls
    /// already reported this round; until they arrive the call returns
    /// [`SyncOutcome::WouldBlock`]. On success the cumulative round offset
    /// is reported. Errors come out exactly once; EOF stays latched and a
    /// fresh round reads it as a zero-length delivery.
    pub fn sync(&mut self, me: PipeId, minlen: usize) -> Result<SyncOutcome, ChannelError> {
        let (need, status, ofs, peer) = {
            let nut = self.nut_mut(me);
            assert!(!nut.buf.is_empty(), "sync before setup_buffer");
            assert!(
                minlen >= 1 && minlen <= nut.max,
                "sync minimum {minlen} outside 1..={}",
                nut.max
            );
            nut.min = nut.reported + minlen;
            (nut.min, nut.err, nut.ofs, nut.peer)
        };

        if let Some(err) = status {
            return self.deliver(me, err, need, ofs);
        }

        // Half-connected, or the peer backed out: nothing can move yet.
        let Some(peer_id) = peer else {
            return Ok(SyncOutcome::WouldBlock);
        };
        let [Some(my_coro), Some(peer_coro)] =
            self.coros.get_disjoint_mut([&me.coro, &peer_id.coro])
        else {
            // The peer record is gone. Forced removals latch a reset through
            // destroy() before the record goes, so a vanished peer with a
            // clean local round means the stream ended.
            self.nut_mut(me).err = Some(ChannelError::Eof);
            return self.deliver(me, ChannelError::Eof, need, ofs);
        };
        let mine = &mut my_coro.pipes[me.nut as usize];
        let theirs = &mut peer_coro.pipes[peer_id.nut as usize];

        // The peer must acknowledge us before bytes can move.
        if theirs.peer != Some(me) {
            return Ok(SyncOutcome::WouldBlock);
        }
        if theirs.err.is_some() {
            // A closed stream reaches a fresh round even if our own latch
            // was wiped by a reset in between; hard errors wait until the
            // peer has recovered.
            if theirs.err == Some(ChannelError::Eof) && mine.ofs == 0 {
                mine.err = Some(ChannelError::Eof);
                return Ok(SyncOutcome::Delivered(0));
            }
            return Ok(SyncOutcome::WouldBlock);
        }
        if theirs.role == Role::None {
            return Ok(SyncOutcome::WouldBlock);
        }
        if theirs.role == mine.role {
            // Roles drifted into collision since the last reset.
            if mine.fault_latched {
                return Ok(SyncOutcome::WouldBlock);
            }
            mine.fault_latched = true;
            theirs.fault_latched = true;
            theirs.err = Some(ChannelError::Protocol);
            peer_coro.activity.trigger(peer_id.nut);
            return Err(ChannelError::Protocol);
        }

        // Move as much as both windows allow, writer to reader.
        let (w, r) = match mine.role {
            Role::Writer => (&mut *mine, &mut *theirs),
            Role::Reader => (&mut *theirs, &mut *mine),
            Role::None => unreachable!("sync requires a role"),
        };
        let len = (w.max - w.ofs).min(r.max - r.ofs);
        if len > 0 {
            r.buf[r.ofs..r.ofs + len].copy_from_slice(&w.buf[w.ofs..w.ofs + len]);
            r.ofs += len;
            w.ofs += len;
        }
        // Wake the peer; it is the one waiting for progress on this pair.
        peer_coro.activity.trigger(peer_id.nut);

        if mine.ofs < need {
            return Ok(SyncOutcome::WouldBlock);
        }
        mine.reported = mine.ofs;
        Ok(SyncOutcome::Delivered(mine.ofs))
    }

    /// Report a latched status to the caller.
    fn deliver(
        &mut self,
        me: PipeId,
        err: ChannelError,
        need: usize,
        ofs: usize,
    ) -> Result<SyncOutcome, ChannelError> {
        match err {
            ChannelError::Eof => {
                if ofs == 0 {
                    // Fresh round: the zero length is the end-of-stream mark.
                    return Ok(SyncOutcome::Delivered(0));
                }
                if ofs >= need {
                    self.nut_mut(me).reported = ofs;
                    return Ok(SyncOutcome::Delivered(ofs));
                }
                // The stream ended short of the requested minimum.
                let peer = self.nut(me).peer;
                if let Some(peer_id) = peer {
                    if self.mutually_bound(me, peer_id) {
                        self.fault_pair(me, peer_id);
                    }
                }
                self.nut_mut(me).err = None;
                Err(ChannelError::Protocol)
            }
            hard => {
                let nut = self.nut_mut(me);
                nut.err = None;
                if hard == ChannelError::ConnReset {
                    nut.peer = None;
                }
                Err(hard)
            }
        }
    }

    // ── Stream closure ──

    /// Writer-side end of stream: close the round at the current offset and
    /// latch EOF on both ends.
    pub fn push_eof(&mut self, p: PipeId) {
        self.finish(p, Role::Writer);
    }

    /// Reader-side analogue of [`Runtime::push_eof`].
    pub fn pull_eof(&mut self, p: PipeId) {
        self.finish(p, Role::Reader);
    }

    fn finish(&mut self, p: PipeId, side: Role) {
        let peer = {
            let nut = self.nut_mut(p);
            if !nut.buf.is_empty() {
                assert_eq!(nut.role, side, "eof pushed from the wrong side of the pipe");
                nut.max = nut.ofs;
            }
            nut.err = Some(ChannelError::Eof);
            nut.peer
        };
        self.notify_peer(p, peer, ChannelError::Eof);
    }

    /// Latch a hard error on both ends and wake the peer.
    pub fn error(&mut self, p: PipeId, code: ChannelError) {
        assert!(
            code != ChannelError::Eof,
            "eof travels through push_eof and pull_eof"
        );
        let peer = {
            let nut = self.nut_mut(p);
            nut.err = Some(code);
            nut.peer
        };
        self.notify_peer(p, peer, code);
    }

    fn notify_peer(&mut self, p: PipeId, peer: Option<PipeId>, code: ChannelError) {
        if let Some(peer_id) = peer {
            if self.mutually_bound(p, peer_id) {
                self.nut_mut(peer_id).err = Some(code);
                self.trigger(peer_id.nut, peer_id.coro);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coro::{Context, CoroBody};

    /// Endpoint holder driven entirely from the outside.
    struct Idle;

    impl CoroBody for Idle {
        fn step(&mut self, _cx: &mut Context<'_>) -> Step {
            Step::EventLoop
        }
    }

    static HOLDER: CoroClass = CoroClass {
        name: "holder",
        nuts: 2,
        handled: 0,
    };

    fn pair(rt: &mut Runtime) -> (PipeId, PipeId) {
        let a = rt.spawn(&HOLDER, Box::new(Idle));
        let b = rt.spawn(&HOLDER, Box::new(Idle));
        (PipeId::new(a, 0), PipeId::new(b, 0))
    }

    fn piped(rt: &mut Runtime) -> (PipeId, PipeId) {
        let (a, b) = pair(rt);
        rt.make_pipe(a, b);
        (a, b)
    }

    // ── Connection protocol ──

    #[test]
    fn make_pipe_binds_both_ends_without_events() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        assert_eq!(rt.nut(a).peer(), Some(b));
        assert_eq!(rt.nut(b).peer(), Some(a));
        assert_eq!(rt.nut(a).phase(), Phase::Connected);
        assert_eq!(rt.inspect(a.coro).unwrap().pending, 0);
        assert_eq!(rt.inspect(b.coro).unwrap().pending, 0);
    }

    #[test]
    fn connect_queues_until_accept_completes_the_pairing() {
        let mut rt = Runtime::new();
        let (a, b) = pair(&mut rt);

        assert_eq!(rt.connect(a, b), ConnectOutcome::Pending);
        assert_eq!(rt.nut(a).peer(), Some(b));
        assert_eq!(rt.nut(b).peer(), None);
        assert_eq!(rt.nut(b).queued(), 1);
        // The acceptor was signalled about the request.
        assert_eq!(rt.inspect(b.coro).unwrap().pending, 1 << b.nut);

        assert_eq!(rt.accept(b), ConnectOutcome::Paired);
        assert_eq!(rt.nut(b).peer(), Some(a));
        assert_eq!(rt.nut(b).queued(), 0);
        // And the requester learns it got in.
        assert_eq!(rt.inspect(a.coro).unwrap().pending, 1 << a.nut);
    }

    #[test]
    fn accept_on_an_empty_queue_is_pending() {
        let mut rt = Runtime::new();
        let (a, _) = pair(&mut rt);
        assert_eq!(rt.accept(a), ConnectOutcome::Pending);
    }

    #[test]
    fn symmetric_connect_short_circuits_to_mutual_pairing() {
        let mut rt = Runtime::new();
        let (a, b) = pair(&mut rt);
        assert_eq!(rt.connect(a, b), ConnectOutcome::Pending);
        assert_eq!(rt.connect(b, a), ConnectOutcome::Paired);
        assert_eq!(rt.nut(a).peer(), Some(b));
        assert_eq!(rt.nut(b).peer(), Some(a));
        assert_eq!(rt.nut(a).queued(), 0);
        assert_eq!(rt.nut(b).queued(), 0);
    }

    #[test]
    fn request_queue_is_fifo() {
        let mut rt = Runtime::new();
        let (a, b) = pair(&mut rt);
        let c = PipeId::new(rt.spawn(&HOLDER, Box::new(Idle)), 0);

        assert_eq!(rt.connect(a, b), ConnectOutcome::Pending);
        assert_eq!(rt.connect(c, b), ConnectOutcome::Pending);
        assert_eq!(rt.nut(b).queued(), 2);

        assert_eq!(rt.accept(b), ConnectOutcome::Paired);
        assert_eq!(rt.nut(b).peer(), Some(a));
        // The later request stays queued for a future endpoint.
        assert_eq!(rt.nut(b).queued(), 1);
    }

    #[test]
    #[should_panic(expected = "non-initial")]
    fn make_pipe_rejects_bound_endpoints() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.make_pipe(a, b);
    }

    #[test]
    #[should_panic(expected = "distinct coroutines")]
    fn make_pipe_rejects_a_self_pair() {
        let mut rt = Runtime::new();
        let coro = rt.spawn(&HOLDER, Box::new(Idle));
        rt.make_pipe(PipeId::new(coro, 0), PipeId::new(coro, 1));
    }

    // ── Transfer rounds ──

    /// Fixed-size handshake: one full window in each direction of the call
    /// order, bytes conserved.
    #[test]
    fn fixed_size_handshake() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![0x41, 0x42]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);

        assert_eq!(rt.sync(a, 2), Ok(SyncOutcome::Delivered(2)));
        assert_eq!(rt.sync(b, 2), Ok(SyncOutcome::Delivered(2)));
        assert_eq!(rt.nut(b).bytes(), &[0x41, 0x42]);
        assert_eq!(rt.nut(a).phase(), Phase::Complete);
        assert_eq!(rt.nut(b).phase(), Phase::Complete);
    }

    /// Variable-length round: the minimum gate blocks until new bytes
    /// arrive, and a stream that ends short of it is a protocol error.
    #[test]
    fn variable_length_minimum_gate() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2, 3, 4, 5]);
        rt.setup_buffer(b, Role::Reader, vec![0; 10]);

        assert_eq!(rt.sync(a, 5), Ok(SyncOutcome::Delivered(5)));
        assert_eq!(rt.sync(b, 3), Ok(SyncOutcome::Delivered(5)));
        // Nothing new arrived, so three more bytes are not there yet.
        assert_eq!(rt.sync(b, 3), Ok(SyncOutcome::WouldBlock));

        rt.push_eof(a);
        assert_eq!(rt.sync(b, 3), Err(ChannelError::Protocol));
        // The writer side is left holding the promoted fault.
        assert_eq!(rt.nut(a).err(), Some(ChannelError::Protocol));
    }

    #[test]
    fn partial_windows_advance_offsets_in_lockstep() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2, 3, 4, 5]);
        rt.setup_buffer(b, Role::Reader, vec![0; 3]);

        // Only the reader window fits; the writer still wants two more.
        assert_eq!(rt.sync(a, 5), Ok(SyncOutcome::WouldBlock));
        assert_eq!(rt.nut(a).offset(), 3);
        assert_eq!(rt.nut(b).offset(), 3);
        assert_eq!(rt.nut(b).phase(), Phase::Complete);
        assert_eq!(rt.nut(a).phase(), Phase::Syncing);

        assert_eq!(rt.sync(b, 3), Ok(SyncOutcome::Delivered(3)));
        assert_eq!(rt.nut(b).bytes(), &[1, 2, 3]);
    }

    /// Role collision reports PROTOCOL on each end exactly once per reset.
    #[test]
    fn role_collision_reports_protocol_once_per_reset() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2]);
        rt.setup_buffer(b, Role::Writer, vec![3, 4]);
        assert_eq!(rt.nut(a).phase(), Phase::Error);
        assert_eq!(rt.nut(b).phase(), Phase::Error);

        assert_eq!(rt.sync(a, 1), Err(ChannelError::Protocol));
        // The peer still holds its report, so the pair stays blocked.
        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::WouldBlock));
        assert_eq!(rt.sync(b, 1), Err(ChannelError::Protocol));
        // Both reports consumed; no second delivery without a reset.
        assert_eq!(rt.sync(b, 1), Ok(SyncOutcome::WouldBlock));
        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::WouldBlock));

        // Correcting one side revives the pair.
        rt.reset_buffer(a, Role::Reader);
        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::Delivered(2)));
        assert_eq!(rt.nut(a).bytes(), &[3, 4]);
    }

    /// A fresh round over a closed stream reads as a zero-length delivery,
    /// and keeps doing so.
    #[test]
    fn clean_eof_reads_as_zero() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![7, 8]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);
        assert_eq!(rt.sync(a, 2), Ok(SyncOutcome::Delivered(2)));
        assert_eq!(rt.sync(b, 2), Ok(SyncOutcome::Delivered(2)));

        rt.reset_buffer(b, Role::Reader);
        rt.push_eof(a);
        assert_eq!(rt.nut(b).phase(), Phase::Eof);
        assert_eq!(rt.sync(b, 1), Ok(SyncOutcome::Delivered(0)));
        assert_eq!(rt.sync(b, 1), Ok(SyncOutcome::Delivered(0)));
    }

    /// A reset between the close and the next look at the stream must not
    /// lose the closure: the fresh round relatches EOF from the peer.
    #[test]
    fn reset_after_close_still_reads_eof() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![7, 8]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);
        assert_eq!(rt.sync(a, 2), Ok(SyncOutcome::Delivered(2)));
        assert_eq!(rt.sync(b, 2), Ok(SyncOutcome::Delivered(2)));

        rt.push_eof(a);
        // The reset wipes the local latch; the peer still holds the close.
        rt.reset_buffer(b, Role::Reader);
        assert_eq!(rt.nut(b).err(), None);
        assert_eq!(rt.sync(b, 1), Ok(SyncOutcome::Delivered(0)));
        assert_eq!(rt.nut(b).phase(), Phase::Eof);
    }

    /// The reader-side close mirrors the writer's: the far end sees a
    /// zero-length round.
    #[test]
    fn pull_eof_closes_the_stream_for_the_writer() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);

        rt.pull_eof(b);
        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::Delivered(0)));
        assert_eq!(rt.nut(a).phase(), Phase::Eof);
    }

    /// A round that satisfied its minimum before the close still delivers
    /// its bytes at EOF.
    #[test]
    fn eof_after_a_sufficient_delivery_reports_the_bytes() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2, 3, 4, 5]);
        rt.setup_buffer(b, Role::Reader, vec![0; 10]);
        assert_eq!(rt.sync(a, 5), Ok(SyncOutcome::Delivered(5)));
        rt.push_eof(a);
        // First look at the round: five bytes cover the minimum.
        assert_eq!(rt.sync(b, 3), Ok(SyncOutcome::Delivered(5)));
    }

    #[test]
    fn reset_round_trip_restores_the_window() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![9; 4]);
        rt.setup_buffer(b, Role::Reader, vec![0; 4]);
        assert_eq!(rt.sync(a, 4), Ok(SyncOutcome::Delivered(4)));

        rt.reset_buffer(a, Role::Writer);
        let nut = rt.nut(a);
        assert_eq!(nut.offset(), 0);
        assert_eq!(nut.err(), None);
        assert_eq!(nut.minimum(), nut.capacity() + 1);
        assert_eq!(nut.phase(), Phase::Ready);
    }

    /// Terminates at its first step, reaping its own record.
    struct Vanishing;

    impl CoroBody for Vanishing {
        fn step(&mut self, cx: &mut Context<'_>) -> Step {
            match cx.point() {
                ResumePoint::Init => {
                    cx.reap_on_exit();
                    Step::Done
                }
                point => unreachable!("vanishing holder resumed at {point:?}"),
            }
        }
    }

    /// A peer that terminated cleanly and was reaped reads as end of
    /// stream, not as a hang.
    #[test]
    fn a_reaped_peer_reads_as_end_of_stream() {
        let mut rt = Runtime::new();
        let holder = rt.spawn(&HOLDER, Box::new(Idle));
        let ghost = rt.spawn(&HOLDER, Box::new(Vanishing));
        let a = PipeId::new(holder, 0);
        rt.make_pipe(a, PipeId::new(ghost, 0));
        rt.setup_buffer(a, Role::Reader, vec![0; 4]);

        assert_eq!(rt.resume(ghost), ResumeOutcome::Terminated);
        assert!(rt.inspect(ghost).is_none());

        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::Delivered(0)));
        assert_eq!(rt.nut(a).phase(), Phase::Eof);
    }

    #[test]
    fn destroying_a_peer_resets_the_survivor() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);

        rt.destroy(b.coro);
        assert_eq!(rt.nut(a).phase(), Phase::Error);
        assert_eq!(rt.sync(a, 1), Err(ChannelError::ConnReset));
        // Delivery of the reset severs the pairing.
        assert_eq!(rt.nut(a).peer(), None);
        assert_eq!(rt.sync(a, 1), Ok(SyncOutcome::WouldBlock));
    }

    #[test]
    fn destroying_the_acceptor_refuses_queued_requests() {
        let mut rt = Runtime::new();
        let (a, b) = pair(&mut rt);
        assert_eq!(rt.connect(a, b), ConnectOutcome::Pending);

        rt.destroy(b.coro);
        assert_eq!(rt.nut(a).err(), Some(ChannelError::ConnReset));
    }

    /// A hard error is delivered exactly once per occurrence, on each end.
    #[test]
    fn hard_errors_are_delivered_once() {
        let mut rt = Runtime::new();
        let (a, b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2]);
        rt.setup_buffer(b, Role::Reader, vec![0; 2]);

        rt.error(a, ChannelError::ConnReset);
        assert_eq!(rt.sync(b, 1), Err(ChannelError::ConnReset));
        assert_eq!(rt.nut(b).peer(), None);
        assert_eq!(rt.sync(b, 1), Ok(SyncOutcome::WouldBlock));
    }

    // ── Precondition faults ──

    #[test]
    #[should_panic(expected = "non-empty window")]
    fn zero_length_setup_is_rejected() {
        let mut rt = Runtime::new();
        let (a, _) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, Vec::new());
    }

    #[test]
    #[should_panic(expected = "sync minimum")]
    fn sync_minimum_beyond_the_window_is_rejected() {
        let mut rt = Runtime::new();
        let (a, _b) = piped(&mut rt);
        rt.setup_buffer(a, Role::Writer, vec![1, 2]);
        let _ = rt.sync(a, 3);
    }

    #[test]
    #[should_panic(expected = "before setup_buffer")]
    fn sync_before_setup_is_rejected() {
        let mut rt = Runtime::new();
        let (a, _) = piped(&mut rt);
        let _ = rt.sync(a, 1);
    }
}
