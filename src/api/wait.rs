//! Reads that cannot complete right away.
//!
//! A read that finds no data (and is allowed to wait) parks a [`Waiter`]
//! in the host's [`WaitQueue`] and hands the client a [`WaitId`]. Later a
//! notifier resumes parked waiters under the host lock. Resuming consumes
//! the waiter: it either completes, is cancelled, or (for data that still
//! does not satisfy it) is parked again under the same id.

use crate::core::{InputEvent, ProcessHandle};
use crate::error::Result;

use super::HostState;

/// Ticket for a parked read
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitId(pub u64);

/// Why a waiter is being resumed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitReason {
    DataReady,
    ProcessExited,
    HandleClosed,
    Cancelled,
}

/// Data handed back by a read
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadData {
    Events(Vec<InputEvent>),
    Text(String),
    Bytes(Vec<u8>),
}

/// Result of a read call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Ready(ReadData),
    Pending(WaitId),
}

/// Captured state of a parked read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waiter {
    /// Raw input events
    DirectRead {
        process: ProcessHandle,
        count: usize,
        peek: bool,
        unicode: bool,
    },
    /// Characters typed into the input stream
    TextRead {
        process: ProcessHandle,
        count: usize,
        unicode: bool,
    },
}

/// What happened to a resumed waiter
#[derive(Debug)]
pub enum Resumed {
    Completed(Result<ReadData>),
    Cancelled(WaitReason),
    Requeued(Waiter),
}

/// Final outcome delivered to the client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed(Result<ReadData>),
    Cancelled(WaitReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub id: WaitId,
    pub process: ProcessHandle,
    pub outcome: WaitOutcome,
}

impl Waiter {
    pub fn process(&self) -> ProcessHandle {
        match self {
            Waiter::DirectRead { process, .. } | Waiter::TextRead { process, .. } => *process,
        }
    }

    /// Resume the read. Must be called with the host lock held.
    pub(crate) fn notify(self, reason: WaitReason, state: &mut HostState) -> Resumed {
        if reason != WaitReason::DataReady {
            return Resumed::Cancelled(reason);
        }

        let attempt = match self {
            Waiter::DirectRead {
                process,
                count,
                peek,
                unicode,
            } => state.try_read_input(process, count, peek, unicode),
            Waiter::TextRead {
                process,
                count,
                unicode,
            } => state.try_read_text(process, count, unicode),
        };

        match attempt {
            Ok(Some(data)) => Resumed::Completed(Ok(data)),
            Ok(None) => Resumed::Requeued(self),
            Err(err) => Resumed::Completed(Err(err)),
        }
    }
}

/// Parked waiters in arrival order
#[derive(Debug, Default)]
pub struct WaitQueue {
    next_id: u64,
    parked: Vec<(WaitId, Waiter)>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&mut self, waiter: Waiter) -> WaitId {
        self.next_id += 1;
        let id = WaitId(self.next_id);
        tracing::debug!("wait {:?} parked for {:?}", id, waiter.process());
        self.parked.push((id, waiter));
        id
    }

    fn requeue(&mut self, id: WaitId, waiter: Waiter) {
        self.parked.push((id, waiter));
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    pub fn take(&mut self, id: WaitId) -> Option<Waiter> {
        let index = self.parked.iter().position(|(parked, _)| *parked == id)?;
        Some(self.parked.remove(index).1)
    }

    pub fn take_all(&mut self) -> Vec<(WaitId, Waiter)> {
        std::mem::take(&mut self.parked)
    }

    pub fn take_for(&mut self, process: ProcessHandle) -> Vec<(WaitId, Waiter)> {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|(_, waiter)| waiter.process() == process);
        self.parked = kept;
        taken
    }
}

/// Notify each waiter once, in order; unsatisfied ones are parked again.
pub(crate) fn resume(state: &mut HostState, waiters: Vec<(WaitId, Waiter)>, reason: WaitReason) -> Vec<Completion> {
    let mut completions = Vec::new();
    for (id, waiter) in waiters {
        let process = waiter.process();
        let outcome = match waiter.notify(reason, state) {
            Resumed::Completed(result) => WaitOutcome::Completed(result),
            Resumed::Cancelled(reason) => WaitOutcome::Cancelled(reason),
            Resumed::Requeued(waiter) => {
                state.waiters.requeue(id, waiter);
                continue;
            }
        };
        tracing::debug!("wait {:?} finished: {:?}", id, outcome);
        completions.push(Completion { id, process, outcome });
    }
    completions
}
