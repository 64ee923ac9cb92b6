//! In-flight request tracking.
//!
//! [`BusyState`] is the advisory "something is outstanding" signal the presentation
//! layer reads to suppress duplicate submissions. It counts calls instead of holding
//! a single boolean so overlapping calls do not clear each other. Per-operation
//! progress is reported through [`MutationTicket`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::members::EntryKey;

/// Shared count of outstanding remote calls for one session.
#[derive(Debug, Clone, Default)]
pub struct BusyState {
    in_flight: Arc<AtomicUsize>,
}

impl BusyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark one call as issued until the returned guard is dropped.
    pub(crate) fn begin(&self) -> BusyGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        BusyGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// Held for the lifetime of one remote call.
#[must_use = "the call counts as outstanding only while the guard is alive"]
#[derive(Debug)]
pub(crate) struct BusyGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Sequence number of a mutation within a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MutationId(pub u64);

impl std::fmt::Display for MutationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Succeeded,
    Failed,
}

/// Handle returned by every mutation.
///
/// The state leaves `Pending` once the remote outcome has been folded back into the
/// synchronizer; a failed mutation has already been rolled back by then.
#[derive(Debug, Clone)]
pub struct MutationTicket {
    pub id: MutationId,
    /// Entry created or removed by the mutation, if any.
    pub key: Option<EntryKey>,
    state: watch::Receiver<RequestState>,
}

impl MutationTicket {
    pub(crate) fn new(
        id: MutationId,
        key: Option<EntryKey>,
        initial: RequestState,
    ) -> (Self, watch::Sender<RequestState>) {
        let (reporter, state) = watch::channel(initial);
        (Self { id, key, state }, reporter)
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == RequestState::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_guards_keep_the_session_busy() {
        let busy = BusyState::new();
        assert!(!busy.is_busy());

        let first = busy.begin();
        let second = busy.clone().begin();
        assert_eq!(busy.in_flight(), 2);

        drop(first);
        assert!(busy.is_busy());
        drop(second);
        assert!(!busy.is_busy());
    }

    #[test]
    fn ticket_observes_reported_state() {
        let (ticket, reporter) = MutationTicket::new(MutationId(3), None, RequestState::Pending);
        assert!(ticket.is_pending());

        reporter.send_replace(RequestState::Failed);
        assert_eq!(ticket.state(), RequestState::Failed);
        assert_eq!(ticket.id.to_string(), "#3");
    }
}
