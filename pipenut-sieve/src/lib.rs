//! Sieve of Eratosthenes as a chain of cooperating coroutines.
//!
//! A candidate generator pumps the integers upward through a growing chain
//! of prime filters. Each filter owns one prime: it drops the multiples,
//! forwards the survivors, and spawns a fresh filter for the first value
//! that makes it through. End of input travels down the chain as EOF on
//! each pipe, unwinding the whole sieve.

use std::cell::RefCell;
use std::rc::Rc;

use pipenut_core::{
    Context, CoroBody, CoroClass, CoroId, Label, PipeId, ResumePoint, Role, Runtime, Step,
    SyncOutcome,
};

/// Primes in discovery order, shared with every filter.
pub type PrimeSink = Rc<RefCell<Vec<u64>>>;

/// Candidates travel as little-endian u64 words.
const WORD: usize = 8;

const GEN_OUT: u8 = 0;
const FILTER_PREV: u8 = 0;
const FILTER_NEXT: u8 = 1;

pub static GENERATOR_CLASS: CoroClass = CoroClass {
    name: "candidate-generator",
    nuts: 1,
    handled: 0,
};

pub static FILTER_CLASS: CoroClass = CoroClass {
    name: "prime-filter",
    nuts: 2,
    handled: 1 << FILTER_PREV,
};

// ─── Candidate generator ──────────────────────────────────────

const L_PUSH: Label = 1;

const R_FIRST_STAGE: u8 = 0;

/// Pumps the integers `2..limit` into the first filter stage, then closes
/// the stream.
pub struct Generator {
    limit: u64,
    candidate: u64,
    sink: PrimeSink,
}

impl Generator {
    pub fn new(limit: u64, sink: PrimeSink) -> Self {
        Self {
            limit,
            candidate: 2,
            sink,
        }
    }

    fn pump(&mut self, cx: &mut Context<'_>) -> Step {
        if self.candidate == self.limit {
            tracing::debug!("candidate generator is ending");
            return Step::Done;
        }
        cx.setup_buffer(GEN_OUT, Role::Writer, self.candidate.to_le_bytes().to_vec());
        self.push(cx)
    }

    fn push(&mut self, cx: &mut Context<'_>) -> Step {
        match cx.sync(GEN_OUT, WORD) {
            Ok(SyncOutcome::Delivered(0)) => {
                // The first stage closed the stream under us.
                tracing::debug!("candidate stream closed downstream");
                Step::Done
            }
            Ok(SyncOutcome::Delivered(_)) => {
                self.candidate += 1;
                self.pump(cx)
            }
            Ok(SyncOutcome::WouldBlock) => Step::Yield(L_PUSH),
            Err(err) => {
                tracing::warn!(%err, "candidate stream failed");
                Step::Done
            }
        }
    }
}

impl CoroBody for Generator {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        match cx.point() {
            ResumePoint::Init => {
                // The first stage handles 2; it drops its own prime from
                // the stream.
                let first = spawn_filter(cx, 2, self.sink.clone());
                cx.make_pipe(GEN_OUT, PipeId::new(first, FILTER_PREV));
                cx.mark_open(R_FIRST_STAGE);
                self.pump(cx)
            }
            ResumePoint::Label(L_PUSH) => self.push(cx),
            ResumePoint::Cleanup(R_FIRST_STAGE) => {
                tracing::debug!("sending eof to the first filter stage");
                cx.push_eof(GEN_OUT);
                Step::CleanupDone
            }
            point => unreachable!("candidate generator resumed at {point:?}"),
        }
    }
}

// ─── Prime filter ─────────────────────────────────────────────

const L_READ: Label = 1;
const L_WRITE: Label = 2;

const R_NEXT_STAGE: u8 = 0;

/// One stage of the sieve. Keeps `filternum` at a multiple of its prime,
/// drops matching candidates, and forwards the rest downstream.
pub struct Filter {
    prime: u64,
    filternum: u64,
    sink: PrimeSink,
}

impl Filter {
    pub fn new(prime: u64, sink: PrimeSink) -> Self {
        Self {
            prime,
            filternum: prime,
            sink,
        }
    }

    fn read(&mut self, cx: &mut Context<'_>) -> Step {
        match cx.sync(FILTER_PREV, WORD) {
            Ok(SyncOutcome::Delivered(0)) => {
                // Upstream dried up; pass the closure on and unwind.
                tracing::debug!(prime = self.prime, "no longer filtering");
                Step::Done
            }
            Ok(SyncOutcome::Delivered(_)) => {
                let word: [u8; WORD] = cx.bytes(FILTER_PREV).try_into().expect("full word");
                self.relay(cx, u64::from_le_bytes(word))
            }
            Ok(SyncOutcome::WouldBlock) => Step::Yield(L_READ),
            Err(err) => {
                eprintln!("fatal: prime filter input failed: {err}");
                std::process::exit(1);
            }
        }
    }

    fn relay(&mut self, cx: &mut Context<'_>, value: u64) -> Step {
        while self.filternum < value {
            self.filternum += self.prime;
        }
        if value == self.filternum {
            // A multiple of our prime; drop it and wait for the next one.
            cx.reset_buffer(FILTER_PREV, Role::Reader);
            return Step::EventLoop;
        }
        if !cx.is_open(R_NEXT_STAGE) {
            // First survivor: it is prime, and it gets its own stage.
            let next = spawn_filter(cx, value, self.sink.clone());
            cx.make_pipe(FILTER_NEXT, PipeId::new(next, FILTER_PREV));
            cx.mark_open(R_NEXT_STAGE);
        }
        cx.setup_buffer(FILTER_NEXT, Role::Writer, value.to_le_bytes().to_vec());
        self.forward(cx)
    }

    fn forward(&mut self, cx: &mut Context<'_>) -> Step {
        match cx.sync(FILTER_NEXT, WORD) {
            Ok(SyncOutcome::Delivered(_)) => {
                cx.reset_buffer(FILTER_PREV, Role::Reader);
                Step::EventLoop
            }
            Ok(SyncOutcome::WouldBlock) => Step::Yield(L_WRITE),
            Err(err) => {
                tracing::warn!(prime = self.prime, %err, "downstream stage failed");
                Step::Done
            }
        }
    }
}

impl CoroBody for Filter {
    fn step(&mut self, cx: &mut Context<'_>) -> Step {
        match cx.point() {
            ResumePoint::Init => {
                println!("New prime number: {}", self.prime);
                self.sink.borrow_mut().push(self.prime);
                cx.reap_on_exit();
                cx.setup_buffer(FILTER_PREV, Role::Reader, vec![0; WORD]);
                Step::EventLoop
            }
            ResumePoint::Event(FILTER_PREV) | ResumePoint::Label(L_READ) => self.read(cx),
            ResumePoint::Label(L_WRITE) => self.forward(cx),
            ResumePoint::Cleanup(R_NEXT_STAGE) => {
                tracing::debug!(prime = self.prime, "sending eof downstream");
                cx.push_eof(FILTER_NEXT);
                Step::CleanupDone
            }
            point => unreachable!("prime filter resumed at {point:?}"),
        }
    }
}

fn spawn_filter(cx: &mut Context<'_>, prime: u64, sink: PrimeSink) -> CoroId {
    cx.spawn(&FILTER_CLASS, Box::new(Filter::new(prime, sink)))
}

/// Run the sieve to completion and return the primes below `limit` in
/// ascending order.
pub fn run_sieve(limit: u64) -> Vec<u64> {
    let sink: PrimeSink = Rc::new(RefCell::new(Vec::new()));
    let mut rt = Runtime::new();
    let generator = rt.spawn(
        &GENERATOR_CLASS,
        Box::new(Generator::new(limit, sink.clone())),
    );
    rt.schedule(generator);

    // The filters reap themselves; the generator is ours to free.
    rt.destroy(generator);
    assert!(rt.is_empty(), "scheduler drained with live coroutines");

    let primes = sink.borrow().clone();
    primes
}
