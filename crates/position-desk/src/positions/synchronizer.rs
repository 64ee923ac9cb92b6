//! Optimistic synchronization of one position aggregate with the remote service.
//!
//! Every mutation is applied to local state before its remote call is issued. Remote
//! calls run as spawned Tokio tasks and report back over a channel; the owner folds
//! those outcomes in with [`PositionSynchronizer::settle`] or
//! [`PositionSynchronizer::poll_completions`]. Successful creates patch the
//! server-assigned identifier into the local entry, and failures undo the optimistic
//! change and surface as [`SyncEvent::RolledBack`].
//!
//! Each `load` starts a new generation. Outcomes of calls issued under an earlier
//! generation are reported as [`SyncEvent::Discarded`] and never touch local state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::busy::{BusyState, MutationId, MutationTicket, RequestState};
use super::domain::{
    Candidate, Member, MemberId, MemberKind, MemberRecord, Position, PositionFields, PositionId,
    Reviewer, TestQuestion,
};
use super::forms::MemberForm;
use super::gateway::{GatewayError, PositionGateway};
use super::members::{Entry, EntryKey, MemberList};

/// Lifecycle of the single aggregate slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Loading,
    Ready,
    LoadFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no position is ready for edits (slot is {0:?})")]
    NotReady(SlotState),
    #[error("form field `{field}` is not acceptable")]
    InvalidForm { field: &'static str },
    #[error("no {kind} entry matches the given key")]
    UnknownEntry { kind: MemberKind },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    UpdateFields,
    AddMember(MemberKind),
    RemoveMember(MemberKind),
}

/// Outcome of one remote call once folded into local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    FieldsPersisted {
        mutation: MutationId,
    },
    MemberCreated {
        mutation: MutationId,
        kind: MemberKind,
        key: EntryKey,
        id: MemberId,
    },
    MemberDeleted {
        mutation: MutationId,
        kind: MemberKind,
        id: MemberId,
    },
    /// The optimistic change was undone. After a failed field update the local fields
    /// show the newest update still in flight, or else the newest confirmed one.
    RolledBack {
        mutation: MutationId,
        action: MutationAction,
        error: GatewayError,
    },
    /// Deleting a member that was removed locally before its create confirmed failed;
    /// the remote copy survives.
    CleanupFailed {
        mutation: MutationId,
        kind: MemberKind,
        id: MemberId,
        error: GatewayError,
    },
    /// Issued before the current aggregate was loaded; ignored.
    Discarded {
        mutation: MutationId,
    },
}

struct LoadedPosition {
    id: PositionId,
    fields: PositionFields,
    confirmed: PositionFields,
    revision: u64,
    confirmed_revision: u64,
    /// Field writes issued but not yet answered, by revision.
    unanswered: BTreeMap<u64, PositionFields>,
}

impl LoadedPosition {
    /// Fold the outcome of the write for `revision` into the local fields.
    ///
    /// The remote copy holds the highest confirmed revision unless a newer write is
    /// still in flight, so the local fields follow whichever of the two is newer.
    fn answer(&mut self, revision: u64, persisted: bool) {
        let written = self.unanswered.remove(&revision);
        if persisted && revision > self.confirmed_revision {
            if let Some(written) = written {
                self.confirmed = written;
                self.confirmed_revision = revision;
            }
        }

        self.fields = match self.unanswered.last_key_value() {
            Some((pending, fields)) if *pending > self.confirmed_revision => fields.clone(),
            _ => self.confirmed.clone(),
        };
    }
}

enum RemoteCall {
    PersistFields(Position),
    Create(MemberRecord),
    Delete(MemberKind, MemberId),
}

impl RemoteCall {
    async fn execute<G>(self, gateway: &G) -> Result<Option<MemberId>, GatewayError>
    where
        G: PositionGateway + ?Sized,
    {
        match self {
            RemoteCall::PersistFields(position) => gateway
                .persist_position_fields(&position)
                .await
                .map(|()| None),
            RemoteCall::Create(MemberRecord::Candidate(candidate)) => {
                gateway.create_candidate(&candidate).await.map(Some)
            }
            RemoteCall::Create(MemberRecord::Reviewer(reviewer)) => {
                gateway.create_reviewer(&reviewer).await.map(Some)
            }
            RemoteCall::Create(MemberRecord::TestQuestion(question)) => {
                gateway.create_test_question(&question).await.map(Some)
            }
            RemoteCall::Delete(kind, id) => gateway.delete_member(kind, id).await.map(|()| None),
        }
    }
}

/// What to do with local state once a call completes.
enum Undo {
    Fields {
        revision: u64,
    },
    Added {
        kind: MemberKind,
        key: EntryKey,
    },
    Removed {
        index: usize,
        key: EntryKey,
        record: MemberRecord,
    },
    Orphan {
        kind: MemberKind,
        id: MemberId,
    },
}

struct Completion {
    generation: u64,
    mutation: MutationId,
    undo: Undo,
    result: Result<Option<MemberId>, GatewayError>,
    reporter: watch::Sender<RequestState>,
}

/// Owner of the current position aggregate and its dependent collections.
///
/// Mutations spawn their remote calls with [`tokio::spawn`] and therefore must be
/// issued from within a Tokio runtime.
pub struct PositionSynchronizer<G> {
    gateway: Arc<G>,
    busy: BusyState,
    state: SlotState,
    loaded: Option<LoadedPosition>,
    candidates: MemberList<Candidate>,
    reviewers: MemberList<Reviewer>,
    tests: MemberList<TestQuestion>,
    generation: u64,
    next_key: u64,
    next_mutation: u64,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<G> fmt::Debug for PositionSynchronizer<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionSynchronizer")
            .field("state", &self.state)
            .field("position_id", &self.loaded.as_ref().map(|loaded| loaded.id))
            .field("generation", &self.generation)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl<G> PositionSynchronizer<G>
where
    G: PositionGateway + 'static,
{
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_busy_state(gateway, BusyState::new())
    }

    /// Share an existing session-wide busy flag.
    pub fn with_busy_state(gateway: Arc<G>, busy: BusyState) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            busy,
            state: SlotState::Empty,
            loaded: None,
            candidates: MemberList::default(),
            reviewers: MemberList::default(),
            tests: MemberList::default(),
            generation: 0,
            next_key: 1,
            next_mutation: 1,
            in_flight: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn busy(&self) -> &BusyState {
        &self.busy
    }

    /// Remote calls whose outcome has not been folded in yet.
    pub fn unsettled(&self) -> usize {
        self.in_flight
    }

    pub fn position_id(&self) -> Option<PositionId> {
        self.loaded.as_ref().map(|loaded| loaded.id)
    }

    pub fn fields(&self) -> Option<&PositionFields> {
        self.loaded.as_ref().map(|loaded| &loaded.fields)
    }

    pub fn candidates(&self) -> &MemberList<Candidate> {
        &self.candidates
    }

    pub fn reviewers(&self) -> &MemberList<Reviewer> {
        &self.reviewers
    }

    pub fn tests(&self) -> &MemberList<TestQuestion> {
        &self.tests
    }

    /// The aggregate as it would be sent to the remote service right now.
    pub fn snapshot(&self) -> Option<Position> {
        let loaded = self.loaded.as_ref()?;
        Some(loaded.fields.clone().into_position(
            loaded.id,
            self.candidates.to_records(),
            self.reviewers.to_records(),
            self.tests.to_records(),
        ))
    }

    /// Replace the slot with the aggregate fetched for `id`.
    ///
    /// Prior local state is discarded as soon as loading begins, so a failed load
    /// leaves the slot empty in [`SlotState::LoadFailed`].
    pub async fn load(&mut self, id: PositionId) -> Result<(), SyncError> {
        self.generation += 1;
        self.discard_local_state();
        self.state = SlotState::Loading;
        info!(position_id = id.0, generation = self.generation, "loading position");

        let fetched = {
            let _busy = self.busy.begin();
            self.gateway.fetch_position(id).await
        };

        match fetched {
            Ok(position) => {
                self.install(position);
                self.state = SlotState::Ready;
                info!(
                    position_id = id.0,
                    candidates = self.candidates.len(),
                    reviewers = self.reviewers.len(),
                    tests = self.tests.len(),
                    "position ready"
                );
                Ok(())
            }
            Err(err) => {
                warn!(position_id = id.0, error = %err, "position load failed");
                self.state = SlotState::LoadFailed;
                Err(err.into())
            }
        }
    }

    /// Write edited fields onto the aggregate and persist the full snapshot.
    pub fn update_fields(&mut self, edited: PositionFields) -> Result<MutationTicket, SyncError> {
        if let Some(field) = edited.rejected_field() {
            self.ready_position_id()?;
            return Err(SyncError::InvalidForm { field });
        }

        let revision = {
            let loaded = self.ready_position()?;
            loaded.revision += 1;
            loaded.fields = edited.clone();
            loaded.unanswered.insert(loaded.revision, edited);
            loaded.revision
        };
        let snapshot = self.snapshot().ok_or(SyncError::NotReady(self.state))?;
        info!(position_id = snapshot.id.0, revision, "position fields updated locally");

        Ok(self.dispatch(
            Undo::Fields { revision },
            RemoteCall::PersistFields(snapshot),
            None,
        ))
    }

    /// Append a new member built from form values and create it remotely.
    ///
    /// The member is stamped with the loaded position's identifier whatever the form
    /// carried, and is visible locally before the create call resolves.
    pub fn add_member(&mut self, form: MemberForm) -> Result<MutationTicket, SyncError> {
        let position_id = self.ready_position_id()?;
        if let Some(field) = form.rejected_field() {
            debug!(kind = %form.kind(), field, "member form rejected");
            return Err(SyncError::InvalidForm { field });
        }

        let record = form.into_record(position_id);
        let kind = record.kind();
        let key = self.allocate_key();
        match record.clone() {
            MemberRecord::Candidate(candidate) => self.candidates.push(key, candidate),
            MemberRecord::Reviewer(reviewer) => self.reviewers.push(key, reviewer),
            MemberRecord::TestQuestion(question) => self.tests.push(key, question),
        }
        info!(position_id = position_id.0, %kind, key = key.value(), "member added locally");

        Ok(self.dispatch(
            Undo::Added { kind, key },
            RemoteCall::Create(record),
            Some(key),
        ))
    }

    /// Remove a member locally and, when it has a server identifier, remotely.
    ///
    /// Members that were never confirmed are removed locally only; if their create
    /// later succeeds the remote copy is deleted during reconciliation.
    pub fn remove_member(
        &mut self,
        kind: MemberKind,
        key: EntryKey,
    ) -> Result<MutationTicket, SyncError> {
        self.ready_position_id()?;
        let (index, record) = self
            .detach(kind, key)
            .ok_or(SyncError::UnknownEntry { kind })?;
        let id = record.id();

        if !id.is_assigned() {
            info!(%kind, key = key.value(), "unconfirmed member removed locally");
            let mutation = self.allocate_mutation();
            let (ticket, _) = MutationTicket::new(mutation, Some(key), RequestState::Succeeded);
            return Ok(ticket);
        }

        info!(%kind, key = key.value(), member_id = id.0, "member removed locally");
        Ok(self.dispatch(
            Undo::Removed { index, key, record },
            RemoteCall::Delete(kind, id),
            Some(key),
        ))
    }

    /// Wait for every outstanding call and fold the outcomes in, in completion order.
    pub async fn settle(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while self.in_flight > 0 {
            let Some(completion) = self.completions_rx.recv().await else {
                break;
            };
            events.push(self.reconcile(completion));
        }
        events
    }

    /// Fold in whatever outcomes have already arrived without waiting.
    pub fn poll_completions(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            events.push(self.reconcile(completion));
        }
        events
    }
}

impl<G> PositionSynchronizer<G>
where
    G: PositionGateway + 'static,
{
    fn ready_position(&mut self) -> Result<&mut LoadedPosition, SyncError> {
        let state = self.state;
        match (state, self.loaded.as_mut()) {
            (SlotState::Ready, Some(loaded)) => Ok(loaded),
            _ => Err(SyncError::NotReady(state)),
        }
    }

    fn ready_position_id(&mut self) -> Result<PositionId, SyncError> {
        self.ready_position().map(|loaded| loaded.id)
    }

    fn allocate_key(&mut self) -> EntryKey {
        let key = EntryKey(self.next_key);
        self.next_key += 1;
        key
    }

    fn allocate_mutation(&mut self) -> MutationId {
        let mutation = MutationId(self.next_mutation);
        self.next_mutation += 1;
        mutation
    }

    fn discard_local_state(&mut self) {
        self.loaded = None;
        self.candidates.clear();
        self.reviewers.clear();
        self.tests.clear();
    }

    fn install(&mut self, position: Position) {
        let fields = position.fields();
        let Position {
            id,
            candidates,
            reviewers,
            tests,
            ..
        } = position;

        append_all(&mut self.candidates, &mut self.next_key, candidates);
        append_all(&mut self.reviewers, &mut self.next_key, reviewers);
        append_all(&mut self.tests, &mut self.next_key, tests);
        self.loaded = Some(LoadedPosition {
            id,
            confirmed: fields.clone(),
            fields,
            revision: 0,
            confirmed_revision: 0,
            unanswered: BTreeMap::new(),
        });
    }

    fn detach(&mut self, kind: MemberKind, key: EntryKey) -> Option<(usize, MemberRecord)> {
        match kind {
            MemberKind::Candidate => self
                .candidates
                .remove(key)
                .map(|(index, entry)| (index, MemberRecord::Candidate(entry.record))),
            MemberKind::Reviewer => self
                .reviewers
                .remove(key)
                .map(|(index, entry)| (index, MemberRecord::Reviewer(entry.record))),
            MemberKind::TestQuestion => self
                .tests
                .remove(key)
                .map(|(index, entry)| (index, MemberRecord::TestQuestion(entry.record))),
        }
    }

    fn restore(&mut self, index: usize, key: EntryKey, record: MemberRecord) {
        match record {
            MemberRecord::Candidate(record) => self.candidates.restore(index, Entry { key, record }),
            MemberRecord::Reviewer(record) => self.reviewers.restore(index, Entry { key, record }),
            MemberRecord::TestQuestion(record) => self.tests.restore(index, Entry { key, record }),
        }
    }

    fn assign_id(&mut self, kind: MemberKind, key: EntryKey, id: MemberId) -> bool {
        match kind {
            MemberKind::Candidate => self.candidates.assign_id(key, id),
            MemberKind::Reviewer => self.reviewers.assign_id(key, id),
            MemberKind::TestQuestion => self.tests.assign_id(key, id),
        }
    }

    fn dispatch(&mut self, undo: Undo, call: RemoteCall, key: Option<EntryKey>) -> MutationTicket {
        let mutation = self.allocate_mutation();
        let (ticket, reporter) = MutationTicket::new(mutation, key, RequestState::Pending);
        let guard = self.busy.begin();
        let gateway = Arc::clone(&self.gateway);
        let completions = self.completions_tx.clone();
        let generation = self.generation;
        self.in_flight += 1;
        debug!(%mutation, generation, "remote call issued");

        tokio::spawn(async move {
            let result = call.execute(gateway.as_ref()).await;
            drop(guard);
            // Fails only once the synchronizer is gone, and then nobody is listening.
            let _ = completions.send(Completion {
                generation,
                mutation,
                undo,
                result,
                reporter,
            });
        });

        ticket
    }

    fn reconcile(&mut self, completion: Completion) -> SyncEvent {
        let Completion {
            generation,
            mutation,
            undo,
            result,
            reporter,
        } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);
        reporter.send_replace(if result.is_ok() {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        });

        if generation != self.generation {
            debug!(%mutation, generation, current = self.generation, "discarding stale outcome");
            return SyncEvent::Discarded { mutation };
        }

        match (undo, result) {
            (Undo::Fields { revision }, Ok(_)) => {
                if let Some(loaded) = self.loaded.as_mut() {
                    loaded.answer(revision, true);
                }
                info!(%mutation, revision, "position fields persisted");
                SyncEvent::FieldsPersisted { mutation }
            }
            (Undo::Fields { revision }, Err(error)) => {
                if let Some(loaded) = self.loaded.as_mut() {
                    loaded.answer(revision, false);
                }
                warn!(%mutation, revision, error = %error, "field update failed");
                SyncEvent::RolledBack {
                    mutation,
                    action: MutationAction::UpdateFields,
                    error,
                }
            }
            (Undo::Added { kind, key }, Ok(id)) => {
                let id = id.unwrap_or(MemberId::UNASSIGNED);
                if !self.assign_id(kind, key, id) && id.is_assigned() {
                    warn!(
                        %mutation,
                        %kind,
                        member_id = id.0,
                        "member removed before confirmation, deleting remote copy"
                    );
                    self.dispatch(Undo::Orphan { kind, id }, RemoteCall::Delete(kind, id), None);
                }
                info!(%mutation, %kind, member_id = id.0, "member created");
                SyncEvent::MemberCreated {
                    mutation,
                    kind,
                    key,
                    id,
                }
            }
            (Undo::Added { kind, key }, Err(error)) => {
                self.detach(kind, key);
                warn!(%mutation, %kind, error = %error, "member create failed, entry removed");
                SyncEvent::RolledBack {
                    mutation,
                    action: MutationAction::AddMember(kind),
                    error,
                }
            }
            (Undo::Removed { record, .. }, Ok(_)) => {
                let kind = record.kind();
                info!(%mutation, %kind, member_id = record.id().0, "member deleted");
                SyncEvent::MemberDeleted {
                    mutation,
                    kind,
                    id: record.id(),
                }
            }
            (Undo::Removed { index, key, record }, Err(error)) => {
                let kind = record.kind();
                self.restore(index, key, record);
                warn!(%mutation, %kind, error = %error, "member delete failed, entry restored");
                SyncEvent::RolledBack {
                    mutation,
                    action: MutationAction::RemoveMember(kind),
                    error,
                }
            }
            (Undo::Orphan { kind, id }, Ok(_)) => SyncEvent::MemberDeleted { mutation, kind, id },
            (Undo::Orphan { kind, id }, Err(error)) => {
                warn!(%mutation, %kind, member_id = id.0, error = %error, "orphan cleanup failed");
                SyncEvent::CleanupFailed {
                    mutation,
                    kind,
                    id,
                    error,
                }
            }
        }
    }
}

fn append_all<T: Member>(list: &mut MemberList<T>, next_key: &mut u64, records: Vec<T>) {
    for record in records {
        list.push(EntryKey(*next_key), record);
        *next_key += 1;
    }
}
