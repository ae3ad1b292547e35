//! Execution state machines
//!
//! Each executor owns one `StateMachine`: the current `ExecutionState`
//! published on a watch channel, the executor's transient fields, and a
//! generation counter. Every run takes a `Ticket` stamped with the
//! generation it started under; `reset()` bumps the generation so a result
//! that resolves after the reset is dropped instead of applied.

use alloy_primitives::B256;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::chains::Chain;
use crate::types::{EngineError, EngineResult};

/// Non-terminal steps, also used to say where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Signing,
    AwaitingAttestation,
    Quoting,
    Approving,
    Executing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Signing => "signing",
            Phase::AwaitingAttestation => "awaiting_attestation",
            Phase::Quoting => "quoting",
            Phase::Approving => "approving",
            Phase::Executing => "executing",
        };
        f.write_str(name)
    }
}

/// On-chain proof of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub tx_hash: B256,
    pub chain: Chain,
    pub explorer_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Signing,
    AwaitingAttestation,
    Quoting,
    Approving,
    Executing,
    Success {
        evidence: Evidence,
    },
    Error {
        phase: Phase,
        code: String,
        message: String,
    },
}

impl ExecutionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExecutionState::Idle)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Success { .. } | ExecutionState::Error { .. })
    }

    /// Step a non-terminal state stands for
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ExecutionState::Idle => Some(Phase::Idle),
            ExecutionState::Signing => Some(Phase::Signing),
            ExecutionState::AwaitingAttestation => Some(Phase::AwaitingAttestation),
            ExecutionState::Quoting => Some(Phase::Quoting),
            ExecutionState::Approving => Some(Phase::Approving),
            ExecutionState::Executing => Some(Phase::Executing),
            ExecutionState::Success { .. } | ExecutionState::Error { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Signing => "signing",
            ExecutionState::AwaitingAttestation => "awaiting_attestation",
            ExecutionState::Quoting => "quoting",
            ExecutionState::Approving => "approving",
            ExecutionState::Executing => "executing",
            ExecutionState::Success { .. } => "success",
            ExecutionState::Error { .. } => "error",
        }
    }

    fn error(phase: Phase, err: &EngineError) -> Self {
        ExecutionState::Error {
            phase,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Generation a run started under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

struct Inner<T> {
    generation: u64,
    transient: T,
}

/// Step state, transient fields and generation counter for one executor
pub struct StateMachine<T> {
    name: &'static str,
    inner: Mutex<Inner<T>>,
    state: watch::Sender<ExecutionState>,
}

impl<T: Default + Clone> StateMachine<T> {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(ExecutionState::Idle);
        Self {
            name,
            inner: Mutex::new(Inner {
                generation: 0,
                transient: T::default(),
            }),
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    pub fn transient(&self) -> T {
        self.lock().transient.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Start a run from Idle. Any other state is `Busy`; a second caller can
    /// never overwrite the transient fields of a run in flight.
    pub fn begin(&self, first: ExecutionState) -> EngineResult<Ticket> {
        let mut inner = self.lock();
        let current = self.state.borrow().clone();
        if !current.is_idle() {
            return Err(EngineError::Busy(format!("{} is {}", self.name, current.name())));
        }

        inner.generation += 1;
        inner.transient = T::default();
        let ticket = Ticket(inner.generation);

        tracing::info!(
            executor = self.name,
            generation = ticket.0,
            step = first.name(),
            "run started"
        );
        self.state.send_replace(first);
        Ok(ticket)
    }

    /// Record a validation failure without entering any working step.
    /// Returns the error to surface: `Busy` if a run is already in flight.
    pub fn reject(&self, err: EngineError) -> EngineError {
        let _inner = self.lock();
        let current = self.state.borrow().clone();
        if !current.is_idle() {
            return EngineError::Busy(format!("{} is {}", self.name, current.name()));
        }
        tracing::warn!(executor = self.name, error = %err, "request rejected");
        self.state.send_replace(ExecutionState::error(Phase::Idle, &err));
        err
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.lock().generation == ticket.0
    }

    /// Move to `next` if `ticket` is still current; otherwise `Superseded`
    pub fn advance(&self, ticket: &Ticket, next: ExecutionState) -> EngineResult<()> {
        let _inner = self.lock_current(ticket)?;
        tracing::info!(
            executor = self.name,
            generation = ticket.0,
            step = next.name(),
            "state transition"
        );
        self.state.send_replace(next);
        Ok(())
    }

    /// Write transient fields if `ticket` is still current
    pub fn record(&self, ticket: &Ticket, update: impl FnOnce(&mut T)) -> EngineResult<()> {
        let mut inner = self.lock_current(ticket)?;
        update(&mut inner.transient);
        Ok(())
    }

    /// Terminal success; `Superseded` if a reset happened meanwhile
    pub fn succeed(&self, ticket: &Ticket, evidence: Evidence) -> EngineResult<Evidence> {
        self.advance(
            ticket,
            ExecutionState::Success {
                evidence: evidence.clone(),
            },
        )?;
        Ok(evidence)
    }

    /// Terminal error at the step the run was in. Stale runs leave the
    /// state untouched.
    pub fn fail(&self, ticket: &Ticket, err: &EngineError) {
        let Ok(_inner) = self.lock_current(ticket) else {
            return;
        };
        let phase = self.state.borrow().phase().unwrap_or(Phase::Idle);
        tracing::error!(
            executor = self.name,
            generation = ticket.0,
            phase = %phase,
            error = %err,
            "run failed"
        );
        self.state.send_replace(ExecutionState::error(phase, err));
    }

    /// Back to Idle with cleared transient fields. Whatever is still in
    /// flight keeps running but can no longer touch this machine.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.transient = T::default();
        tracing::info!(executor = self.name, generation = inner.generation, "reset");
        self.state.send_replace(ExecutionState::Idle);
    }

    fn lock_current(&self, ticket: &Ticket) -> EngineResult<MutexGuard<'_, Inner<T>>> {
        let inner = self.lock();
        if inner.generation != ticket.0 {
            tracing::debug!(
                executor = self.name,
                stale = ticket.0,
                current = inner.generation,
                "discarding result from superseded run"
            );
            return Err(EngineError::Superseded);
        }
        Ok(inner)
    }
}
