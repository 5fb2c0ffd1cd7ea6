//! Cross-thread cycle detection for cached instances.
//!
//! A [`ResolutionStack`] only sees the keys of its own call. When two threads
//! each start building a singleton that needs the other's, both end up
//! blocked on a cell the other is initialising. [`InFlight`] records which
//! thread owns each cell under construction and which cell each thread is
//! blocked on, so the thread that closes such a wait loop fails instead of
//! blocking.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::ResolutionStack;
use crate::error::{AppResult, ApplicationError};
use crate::key::{short_type_name, Key};

/// Identity of one lazily initialised cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CellId {
    addr: usize,
    key: Key,
}

impl CellId {
    pub(crate) fn of<T>(cell: &OnceCell<T>, key: Key) -> Self {
        Self {
            addr: cell as *const OnceCell<T> as usize,
            key,
        }
    }
}

#[derive(Default)]
struct Graph {
    owners: HashMap<CellId, ThreadId>,
    waiting: HashMap<ThreadId, CellId>,
}

/// Owners of cells being built and the threads waiting on them.
#[derive(Default)]
pub(crate) struct InFlight {
    graph: Mutex<Graph>,
}

impl InFlight {
    /// Records that the current thread is about to block on `cell`.
    ///
    /// Fails with a circular dependency error when the owner of `cell` is,
    /// directly or through other waiting threads, waiting on a cell this
    /// thread is building.
    pub(crate) fn wait_for(&self, cell: CellId, stack: &ResolutionStack) -> AppResult<WaitGuard<'_>> {
        let me = thread::current().id();
        let mut graph = self.graph.lock();

        let mut walked = Vec::new();
        let mut next = cell;
        // Every step visits a distinct owner, so the walk ends after at most
        // one step per in-flight cell.
        for _ in 0..=graph.owners.len() {
            let Some(&owner) = graph.owners.get(&next) else { break };
            if owner == me {
                return Err(cycle(stack, &walked, next.key));
            }
            let Some(&blocked_on) = graph.waiting.get(&owner) else { break };
            walked.push(next.key);
            next = blocked_on;
        }

        graph.waiting.insert(me, cell);
        Ok(WaitGuard { in_flight: self, me, cell })
    }

    /// Marks the current thread as the builder of `cell`.
    pub(crate) fn own(&self, cell: CellId) -> OwnerGuard<'_> {
        let me = thread::current().id();
        let mut graph = self.graph.lock();
        graph.waiting.remove(&me);
        graph.owners.insert(cell, me);
        OwnerGuard { in_flight: self, cell }
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        let graph = self.graph.lock();
        graph.owners.is_empty() && graph.waiting.is_empty()
    }
}

fn cycle(stack: &ResolutionStack, walked: &[Key], repeated: Key) -> ApplicationError {
    let mut keys = stack.keys_from(&repeated);
    // The first walked key is the one this thread is about to wait on, which
    // is already the top of its own stack.
    let skip = usize::from(keys.last() == walked.first());
    keys.extend(walked.iter().skip(skip).copied());
    keys.push(repeated);
    ApplicationError::circular_dependency(keys.iter().map(|k| short_type_name(k.display_name())).collect())
}

/// Clears the current thread's wait record on drop.
pub(crate) struct WaitGuard<'a> {
    in_flight: &'a InFlight,
    me: ThreadId,
    cell: CellId,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut graph = self.in_flight.graph.lock();
        if graph.waiting.get(&self.me) == Some(&self.cell) {
            graph.waiting.remove(&self.me);
        }
    }
}

/// Releases ownership of a cell on drop, whether construction succeeded,
/// failed or unwound.
pub(crate) struct OwnerGuard<'a> {
    in_flight: &'a InFlight,
    cell: CellId,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.graph.lock().owners.remove(&self.cell);
    }
}
