//! Single-flight admission gate
//!
//! `Idle → Reserved(gen) → Streaming(gen) → Idle`. A reservation is taken
//! before negotiation so concurrent starts are rejected instead of racing,
//! and only a committed reservation counts as "in progress". Every
//! reservation carries a generation so a session that outlived a forced
//! reset cannot clear the flag of the session that replaced it.

use crate::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Reserved(u64),
    Streaming(u64),
}

#[derive(Debug)]
struct Inner {
    state: State,
    next_generation: u64,
}

/// Admission flag owned by the session coordinator
#[derive(Debug)]
pub struct Admission {
    inner: Mutex<Inner>,
}

impl Default for Admission {
    fn default() -> Self {
        Self::new()
    }
}

impl Admission {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Idle,
                next_generation: 1,
            }),
        }
    }

    /// Atomically claim the gate for a new session
    pub fn try_reserve(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Idle => {
                let generation = inner.next_generation;
                inner.next_generation += 1;
                inner.state = State::Reserved(generation);
                debug!(generation, "Admission reserved");
                Ok(generation)
            }
            State::Reserved(_) | State::Streaming(_) => Err(Error::AlreadyInProgress),
        }
    }

    /// Promote a reservation once negotiation and both bridges are up
    pub fn commit(&self, generation: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == State::Reserved(generation) {
            inner.state = State::Streaming(generation);
            Ok(())
        } else {
            warn!(generation, "Admission reservation lost before commit");
            Err(Error::AdmissionLost)
        }
    }

    /// Drop a reservation that never reached streaming
    pub fn abandon(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.state == State::Reserved(generation) {
            inner.state = State::Idle;
        }
    }

    /// Clear the flag if it still belongs to `generation`
    pub fn release(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Reserved(g) | State::Streaming(g) if g == generation => {
                inner.state = State::Idle;
                true
            }
            _ => false,
        }
    }

    /// Clear the flag unconditionally; returns whether it was set
    pub fn force_reset(&self) -> bool {
        let mut inner = self.inner.lock();
        let was_set = inner.state != State::Idle;
        inner.state = State::Idle;
        was_set
    }

    /// True while a committed session holds the gate
    pub fn in_progress(&self) -> bool {
        matches!(self.inner.lock().state, State::Streaming(_))
    }

    /// True while any reservation holds the gate
    pub fn is_held(&self) -> bool {
        self.inner.lock().state != State::Idle
    }
}
