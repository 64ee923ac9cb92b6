use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::positions::busy::BusyState;
use crate::positions::codec;
use crate::positions::domain::{
    Candidate, MemberId, MemberKind, MemberRecord, Position, PositionId, Reviewer, TestQuestion,
};
use crate::positions::forms::{CandidateForm, MemberForm, ReviewerForm, TestQuestionForm};
use crate::positions::gateway::{GatewayError, PositionGateway};

pub(super) fn engineer_position() -> Position {
    Position {
        id: PositionId(42),
        number: "ENG-42".to_string(),
        name: "Engineer".to_string(),
        company_info: "Platform team".to_string(),
        instruction: "Answer every question".to_string(),
        about: "Backend services in Rust".to_string(),
        open_date: codec::to_calendar(0),
        close_date: codec::to_calendar(2_592_000),
        candidates: Vec::new(),
        reviewers: Vec::new(),
        tests: Vec::new(),
    }
}

pub(super) fn staffed_position() -> Position {
    let id = PositionId(7);
    Position {
        id,
        number: "OPS-7".to_string(),
        name: "Site Reliability Engineer".to_string(),
        company_info: String::new(),
        instruction: String::new(),
        about: String::new(),
        open_date: codec::to_calendar(1_700_000_000),
        close_date: codec::to_calendar(1_702_592_000),
        candidates: vec![
            Candidate {
                id: MemberId(11),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: "555-0101".to_string(),
                invitation_date: Some(codec::to_calendar(1_700_086_400)),
                expired_date: None,
                position_id: id,
            },
            Candidate {
                id: MemberId(12),
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                phone: String::new(),
                invitation_date: None,
                expired_date: None,
                position_id: id,
            },
        ],
        reviewers: vec![Reviewer {
            id: MemberId(21),
            name: "Linus".to_string(),
            email: "linus@example.com".to_string(),
            number: "R-1".to_string(),
            invitation_date: None,
            position_id: id,
        }],
        tests: vec![TestQuestion {
            id: MemberId(31),
            name: "Reverse a linked list".to_string(),
            time: 600,
            position_id: id,
        }],
    }
}

pub(super) fn candidate_form(name: &str) -> MemberForm {
    MemberForm::Candidate(CandidateForm {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        ..CandidateForm::default()
    })
}

pub(super) fn reviewer_form(name: &str) -> MemberForm {
    MemberForm::Reviewer(ReviewerForm {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        number: "R-9".to_string(),
        invitation_date: None,
    })
}

pub(super) fn question_form(name: &str, minutes: &str) -> MemberForm {
    MemberForm::TestQuestion(TestQuestionForm {
        name: name.to_string(),
        time: minutes.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Call {
    Fetch(PositionId),
    Persist(Position),
    Create(MemberRecord),
    Delete(MemberKind, MemberId),
}

/// In-memory gateway that records calls, can fail scripted writes, and can hold
/// writes open until the test releases them, either in arrival order or one call at
/// a time.
#[derive(Default)]
pub(super) struct FakeGateway {
    positions: Mutex<HashMap<PositionId, Position>>,
    calls: Mutex<Vec<Call>>,
    scripted_failures: Mutex<VecDeque<GatewayError>>,
    next_id: AtomicI64,
    gate: Option<Arc<Semaphore>>,
    gate_each_call: bool,
    call_gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
    busy: Mutex<Option<BusyState>>,
    busy_observations: Mutex<Vec<bool>>,
}

impl FakeGateway {
    /// Writes wait for [`FakeGateway::release`] before answering.
    pub(super) fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Each write waits for [`FakeGateway::release_call`] with its own call index.
    pub(super) fn gated_per_call() -> Self {
        Self {
            gate_each_call: true,
            ..Self::default()
        }
    }

    pub(super) fn with_position(self, position: Position) -> Self {
        self.positions
            .lock()
            .expect("positions mutex poisoned")
            .insert(position.id, position);
        self
    }

    pub(super) fn release(&self, writes: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(writes);
        }
    }

    /// Let the call recorded at `index` in [`FakeGateway::calls`] answer.
    pub(super) fn release_call(&self, index: usize) {
        self.call_gate(index).add_permits(1);
    }

    /// The next write answers with `error`; queued failures apply in call order.
    pub(super) fn fail_next(&self, error: GatewayError) {
        self.scripted_failures
            .lock()
            .expect("failure mutex poisoned")
            .push_back(error);
    }

    /// Record the busy flag at the moment each call arrives.
    pub(super) fn observe(&self, busy: BusyState) {
        *self.busy.lock().expect("busy mutex poisoned") = Some(busy);
    }

    pub(super) fn busy_observations(&self) -> Vec<bool> {
        self.busy_observations
            .lock()
            .expect("busy mutex poisoned")
            .clone()
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub(super) fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Fetch(_)))
            .collect()
    }

    fn call_gate(&self, index: usize) -> Arc<Semaphore> {
        let mut gates = self.call_gates.lock().expect("gate mutex poisoned");
        Arc::clone(
            gates
                .entry(index)
                .or_insert_with(|| Arc::new(Semaphore::new(0))),
        )
    }

    fn record(&self, call: Call) -> usize {
        if let Some(busy) = self.busy.lock().expect("busy mutex poisoned").as_ref() {
            self.busy_observations
                .lock()
                .expect("busy mutex poisoned")
                .push(busy.is_busy());
        }
        let mut calls = self.calls.lock().expect("calls mutex poisoned");
        calls.push(call);
        calls.len() - 1
    }

    async fn answer_write(&self, index: usize) -> Result<(), GatewayError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.gate_each_call {
            let gate = self.call_gate(index);
            gate.acquire().await.expect("gate closed").forget();
        }
        match self
            .scripted_failures
            .lock()
            .expect("failure mutex poisoned")
            .pop_front()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn answer_create(&self, index: usize) -> Result<MemberId, GatewayError> {
        self.answer_write(index).await?;
        Ok(MemberId(100 + self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

#[async_trait]
impl PositionGateway for FakeGateway {
    async fn fetch_position(&self, id: PositionId) -> Result<Position, GatewayError> {
        self.record(Call::Fetch(id));
        self.positions
            .lock()
            .expect("positions mutex poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("position {}", id.0)))
    }

    async fn persist_position_fields(&self, position: &Position) -> Result<(), GatewayError> {
        let index = self.record(Call::Persist(position.clone()));
        self.answer_write(index).await
    }

    async fn create_candidate(&self, candidate: &Candidate) -> Result<MemberId, GatewayError> {
        let index = self.record(Call::Create(MemberRecord::Candidate(candidate.clone())));
        self.answer_create(index).await
    }

    async fn create_reviewer(&self, reviewer: &Reviewer) -> Result<MemberId, GatewayError> {
        let index = self.record(Call::Create(MemberRecord::Reviewer(reviewer.clone())));
        self.answer_create(index).await
    }

    async fn create_test_question(
        &self,
        question: &TestQuestion,
    ) -> Result<MemberId, GatewayError> {
        let index = self.record(Call::Create(MemberRecord::TestQuestion(question.clone())));
        self.answer_create(index).await
    }

    async fn delete_member(&self, kind: MemberKind, id: MemberId) -> Result<(), GatewayError> {
        let index = self.record(Call::Delete(kind, id));
        self.answer_write(index).await
    }
}
