use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::activity::{ActivityFlags, Signal};
use crate::coro::{Context, Coro, CoroBody};
use crate::pipe::PipeNut;
use crate::types::*;

/// The cooperative runtime: every coroutine record, plus the FIFO of
/// runnable ones.
///
/// Execution is strictly single-threaded; at most one coroutine runs at any
/// instant and it runs to its next voluntary yield. The only operation
/// other threads get is the [`Signal`] trigger.
pub struct Runtime {
    pub(crate) coros: HashMap<CoroId, Coro>,
    run_queue: VecDeque<CoroId>,
}

/// Snapshot of one coroutine for diagnostics.
#[derive(Debug, Clone)]
pub struct CoroInspection {
    pub id: CoroId,
    pub class: &'static str,
    pub resume: ResumePoint,
    pub open_resources: u32,
    /// Pending activity mask at the time of the snapshot.
    pub pending: u32,
    pub nuts: Vec<Phase>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            coros: HashMap::new(),
            run_queue: VecDeque::new(),
        }
    }

    /// Create a record for `class`, wire up its pipe-nut array, and append
    /// it to the runnable queue. The new coroutine first runs at the next
    /// dequeue step.
    pub fn spawn(&mut self, class: &'static CoroClass, body: Box<dyn CoroBody>) -> CoroId {
        assert!(
            class.nuts as usize <= MAX_NUTS,
            "class {} declares more pipe nuts than there are event bits",
            class.name
        );
        let id = uuid::Uuid::now_v7();
        let coro = Coro {
            id,
            class,
            resume: ResumePoint::Init,
            cleanup_return: ResumePoint::Sweep,
            open_resources: 0,
            activity: Arc::new(ActivityFlags::new()),
            pipes: (0..class.nuts).map(|_| PipeNut::new()).collect(),
            body: Some(body),
            reap_on_exit: false,
        };
        self.coros.insert(id, coro);
        self.run_queue.push_back(id);
        tracing::debug!(coro = %id, class = class.name, "spawned");
        id
    }

    /// Cross-thread trigger handle for one coroutine, or `None` if the
    /// record is gone.
    pub fn signal(&self, id: CoroId) -> Option<Signal> {
        self.coros.get(&id).map(|c| Signal::new(c.activity.clone()))
    }

    /// Raise `event` on `target` from the owning thread.
    pub fn trigger(&self, event: u8, target: CoroId) {
        if let Some(coro) = self.coros.get(&target) {
            coro.activity.trigger(event);
        }
    }

    pub fn inspect(&self, id: CoroId) -> Option<CoroInspection> {
        self.coros.get(&id).map(|c| CoroInspection {
            id: c.id,
            class: c.class.name,
            resume: c.resume,
            open_resources: c.open_resources,
            pending: c.activity.snapshot(),
            nuts: c.pipes.iter().map(PipeNut::phase).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.coros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coros.is_empty()
    }

    pub(crate) fn coro(&self, id: CoroId) -> &Coro {
        self.coros.get(&id).expect("unknown coroutine")
    }

    pub(crate) fn coro_mut(&mut self, id: CoroId) -> &mut Coro {
        self.coros.get_mut(&id).expect("unknown coroutine")
    }

    fn finished(&self, id: CoroId) -> bool {
        self.coros
            .get(&id)
            .map_or(true, |c| matches!(c.resume, ResumePoint::Terminated))
    }

    /// Drive one coroutine until it yields or terminates.
    ///
    /// Internal transfers (dispatcher routing, cleanup blocks, explicit
    /// continuations) happen here without going back through the scheduler;
    /// only a yield or termination returns control. A destroyed or
    /// terminated record reports `Terminated` consistently.
    pub fn resume(&mut self, id: CoroId) -> ResumeOutcome {
        let Some(coro) = self.coros.get_mut(&id) else {
            return ResumeOutcome::Terminated;
        };
        if matches!(coro.resume, ResumePoint::Terminated) {
            return ResumeOutcome::Terminated;
        }
        let mut body = coro.body.take().expect("coroutine stepped re-entrantly");

        let outcome = loop {
            let point = match self.coros.get(&id) {
                Some(c) => c.resume,
                // The body destroyed its own record mid-step.
                None => break ResumeOutcome::Terminated,
            };
            match point {
                ResumePoint::Terminated => break ResumeOutcome::Terminated,

                ResumePoint::EventLoop => {
                    let coro = self.coros.get_mut(&id).expect("record checked above");
                    match coro.activity.take_highest() {
                        None => break ResumeOutcome::MoreWork,
                        Some(event) => {
                            if coro.class.handled & (1u32 << event) != 0 {
                                coro.resume = ResumePoint::Event(event);
                            } else {
                                // No handler declared: drained silently.
                                tracing::trace!(coro = %id, event, "unhandled event drained");
                            }
                        }
                    }
                }

                ResumePoint::Sweep => {
                    let coro = self.coros.get_mut(&id).expect("record checked above");
                    if coro.open_resources == 0 {
                        coro.resume = ResumePoint::Terminated;
                        tracing::debug!(coro = %id, class = coro.class.name, "terminated");
                        break ResumeOutcome::Terminated;
                    }
                    // Declaration order: lowest resource bit first.
                    let resource = coro.open_resources.trailing_zeros() as u8;
                    coro.cleanup_return = ResumePoint::Sweep;
                    coro.resume = ResumePoint::Cleanup(resource);
                }

                ResumePoint::Await { target, then } => {
                    if self.finished(target) {
                        self.coro_mut(id).resume = ResumePoint::Label(then);
                    } else {
                        break ResumeOutcome::MoreWork;
                    }
                }

                ResumePoint::Init
                | ResumePoint::Label(_)
                | ResumePoint::Event(_)
                | ResumePoint::Cleanup(_) => {
                    let step = body.step(&mut Context {
                        rt: &mut *self,
                        id,
                        point,
                    });
                    let Some(coro) = self.coros.get_mut(&id) else {
                        break ResumeOutcome::Terminated;
                    };
                    match step {
                        Step::Yield(label) => {
                            coro.resume = ResumePoint::Label(label);
                            break ResumeOutcome::MoreWork;
                        }
                        Step::EventLoop => coro.resume = ResumePoint::EventLoop,
                        Step::Done => coro.resume = ResumePoint::Sweep,
                        Step::Cleanup { resource, then } => {
                            if coro.open_resources & (1u32 << resource) != 0 {
                                coro.cleanup_return = ResumePoint::Label(then);
                                coro.resume = ResumePoint::Cleanup(resource);
                            } else {
                                coro.resume = ResumePoint::Label(then);
                            }
                        }
                        Step::CleanupDone => {
                            let ResumePoint::Cleanup(resource) = point else {
                                panic!("cleanup completion outside a cleanup block");
                            };
                            coro.open_resources &= !(1u32 << resource);
                            coro.resume = coro.cleanup_return;
                        }
                        Step::Await { target, then } => {
                            coro.resume = ResumePoint::Await { target, then };
                        }
                    }
                }
            }
        };

        let reap = match self.coros.get_mut(&id) {
            Some(coro) => {
                coro.body = Some(body);
                matches!(coro.resume, ResumePoint::Terminated) && coro.reap_on_exit
            }
            None => false,
        };
        if reap {
            self.coros.remove(&id);
            tracing::debug!(coro = %id, "reaped");
        }
        outcome
    }

    /// Run the FIFO until every runnable coroutine has terminated.
    ///
    /// Round robin, no priorities: a coroutine reporting more work goes to
    /// the tail, and coroutines spawned mid-drain join the rotation at the
    /// next dequeue.
    pub fn schedule(&mut self, root: CoroId) {
        if !self.run_queue.contains(&root) {
            self.run_queue.push_back(root);
        }
        let mut steps = 0u64;
        while let Some(id) = self.run_queue.pop_front() {
            if !self.coros.contains_key(&id) {
                continue;
            }
            steps += 1;
            match self.resume(id) {
                ResumeOutcome::MoreWork => self.run_queue.push_back(id),
                ResumeOutcome::Terminated => {}
            }
        }
        tracing::debug!(steps, "scheduler drained");
    }

    /// Drop a record outright. Fully paired peers learn about it as a
    /// connection reset; queued connection requests are refused the same
    /// way.
    pub fn destroy(&mut self, id: CoroId) {
        let Some(coro) = self.coros.remove(&id) else {
            return;
        };
        for (idx, nut) in coro.pipes.iter().enumerate() {
            let me = PipeId::new(id, idx as u8);
            for &req in &nut.queue {
                if let Some(reqnut) = self.try_nut_mut(req) {
                    if reqnut.peer == Some(me) && reqnut.err.is_none() {
                        reqnut.err = Some(ChannelError::ConnReset);
                    }
                }
                self.trigger(req.nut, req.coro);
            }
            if let Some(peer_id) = nut.peer {
                if let Some(peernut) = self.try_nut_mut(peer_id) {
                    if peernut.peer == Some(me) {
                        // An undelivered status wins over the reset notice.
                        if peernut.err.is_none() {
                            peernut.err = Some(ChannelError::ConnReset);
                        }
                        self.trigger(peer_id.nut, peer_id.coro);
                    } else {
                        // Half-connected: withdraw our pending request.
                        peernut.queue.retain(|q| *q != me);
                    }
                }
            }
        }
        tracing::debug!(coro = %id, class = coro.class.name, "destroyed");
    }

    fn try_nut_mut(&mut self, p: PipeId) -> Option<&mut PipeNut> {
        self.coros
            .get_mut(&p.coro)
            .and_then(|c| c.pipes.get_mut(p.nut as usize))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
