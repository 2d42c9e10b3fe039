//! One-shot gates used to order dependent transfers.
//!
//! Every transfer owns a gate, exposed through its `TransferHandle`. The gate
//! starts `Pending`, and is resolved exactly once: `Committed` when the
//! transfer commits, `Failed` on any other outcome. Once resolved, it never
//! changes again and every waiter is woken up.
//!
//! Gates are independent from the account locks: they decide which transfer
//! may start, the reservations decide who may touch an account.

use super::transfer::TransferError;
use super::TransferId;

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// The transfer hasn't reached its commit point, or hasn't run yet.
    Pending,

    /// The transfer was fully applied.
    Committed,

    /// The transfer ended without being applied (or was rolled back).
    Failed,
}

struct Gate {
    state: Mutex<GateState>,
    resolved: Condvar,
    claimed: AtomicBool,
}

/// A reference to a transfer, that other transfers can wait on.
///
/// Handles are cheap to clone, and can be handed out before the transfer
/// they point to starts running.
#[derive(Clone)]
pub struct TransferHandle {
    id: TransferId,
    gate: Arc<Gate>,
}

impl TransferHandle {
    pub(super) fn new() -> Self {
        Self {
            id: NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed),
            gate: Arc::new(Gate {
                state: Mutex::new(GateState::Pending),
                resolved: Condvar::new(),
                claimed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn state(&self) -> GateState {
        *self.gate.state.lock()
    }

    /// Block until the transfer is resolved, and return how it ended.
    ///
    /// Returns `TransferError::Cancelled` as soon as `cancellation` is
    /// cancelled, even if the gate is still pending.
    pub fn wait(&self, cancellation: &Cancellation) -> Result<GateState, TransferError> {
        cancellation.watch(&self.gate);

        let mut state = self.gate.state.lock();
        while *state == GateState::Pending {
            if cancellation.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            self.gate.resolved.wait(&mut state);
        }

        Ok(*state)
    }

    // A transfer can only be executed once, since its gate can only be
    // resolved once.
    pub(super) fn claim(&self) -> bool {
        !self.gate.claimed.swap(true, Ordering::AcqRel)
    }

    // A transfer dropped without ever running fails its gate, so that its
    // dependents don't wait on it forever.
    pub(super) fn abandon(&self) {
        if self.claim() {
            self.resolve(GateState::Failed);
        }
    }

    fn resolve(&self, outcome: GateState) {
        let mut state = self.gate.state.lock();
        if *state == GateState::Pending {
            *state = outcome;
            self.gate.resolved.notify_all();
        }
    }
}

impl std::fmt::Debug for TransferHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves a transfer's gate, whatever happens to the transfer.
///
/// Unless `commit` is called, dropping it fails the gate, so dependents never
/// wait on a transfer that is gone.
pub(super) struct Completion<'a> {
    handle: &'a TransferHandle,
}

impl<'a> Completion<'a> {
    pub(super) fn new(handle: &'a TransferHandle) -> Self {
        Self { handle }
    }

    pub(super) fn commit(self) {
        self.handle.resolve(GateState::Committed);
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        // No-op after `commit`: a resolved gate never changes.
        self.handle.resolve(GateState::Failed);
    }
}

/// A token to interrupt transfers blocked on a prerequisite.
///
/// Clones share the same state: cancelling one cancels them all.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<CancellationInner>,
}

#[derive(Default)]
struct CancellationInner {
    cancelled: AtomicBool,
    watched: Mutex<Vec<Weak<Gate>>>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wake up every wait observing this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);

        let watched = std::mem::take(&mut *self.inner.watched.lock());
        for gate in watched.iter().filter_map(Weak::upgrade) {
            // Taking the gate's lock before notifying guarantees the waiter is
            // either before its cancellation check, or already parked.
            let _state = gate.state.lock();
            gate.resolved.notify_all();
        }
    }

    fn watch(&self, gate: &Arc<Gate>) {
        let mut watched = self.inner.watched.lock();
        watched.retain(|gate| gate.strong_count() > 0);
        watched.push(Arc::downgrade(gate));
    }
}

#[cfg(test)]
mod tests {
    use super::{Cancellation, Completion, GateState, TransferHandle};
    use crate::ledger::transfer::TransferError;

    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_handles_are_unique() {
        let a = TransferHandle::new();
        let b = TransferHandle::new();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_claim_once() {
        let handle = TransferHandle::new();
        assert!(handle.claim());
        assert!(!handle.clone().claim());
    }

    #[test]
    fn test_commit_wakes_every_waiter() {
        let handle = TransferHandle::new();
        let (tx, rx) = mpsc::channel();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let tx = tx.clone();
                std::thread::spawn(move || {
                    tx.send(handle.wait(&Cancellation::new())).unwrap();
                })
            })
            .collect();

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        Completion::new(&handle).commit();
        for _ in 0..4 {
            let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(Ok(GateState::Committed), got);
        }
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    // Dropping the completion without committing fails the gate.
    fn test_drop_fails_gate() {
        let handle = TransferHandle::new();
        drop(Completion::new(&handle));

        assert_eq!(GateState::Failed, handle.state());
        assert_eq!(Ok(GateState::Failed), handle.wait(&Cancellation::new()));
    }

    #[test]
    // A resolved gate never re-closes nor changes outcome.
    fn test_resolved_once() {
        let handle = TransferHandle::new();
        Completion::new(&handle).commit();
        drop(Completion::new(&handle));

        assert_eq!(GateState::Committed, handle.state());
    }

    #[test]
    fn test_abandon_unclaimed() {
        let handle = TransferHandle::new();
        handle.abandon();

        assert_eq!(GateState::Failed, handle.state());
        assert!(!handle.claim());
    }

    #[test]
    // Once claimed, the gate belongs to whoever runs the transfer.
    fn test_abandon_claimed() {
        let handle = TransferHandle::new();
        assert!(handle.claim());
        handle.abandon();

        assert_eq!(GateState::Pending, handle.state());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let handle = TransferHandle::new();
        let cancellation = Cancellation::new();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let handle = handle.clone();
            let cancellation = cancellation.clone();
            std::thread::spawn(move || tx.send(handle.wait(&cancellation)).unwrap())
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        cancellation.cancel();

        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(Err(TransferError::Cancelled), got);
        assert_eq!(GateState::Pending, handle.state());
        waiter.join().unwrap();
    }

    #[test]
    fn test_already_cancelled() {
        let handle = TransferHandle::new();
        let cancellation = Cancellation::new();
        cancellation.cancel();

        assert!(cancellation.is_cancelled());
        assert_eq!(Err(TransferError::Cancelled), handle.wait(&cancellation));
    }
}
