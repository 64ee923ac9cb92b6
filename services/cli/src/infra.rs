use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use position_desk::positions::codec;
use position_desk::positions::{
    Candidate, MemberId, MemberKind, MemberRecord, Position, PositionId, Reviewer, TestQuestion,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreError {
    NotFound(String),
    Mismatch(String),
    Invalid(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "{what} not found"),
            StoreError::Mismatch(message) | StoreError::Invalid(message) => f.write_str(message),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    positions: HashMap<PositionId, Position>,
    last_member_id: i64,
}

/// Positions service state kept in memory for local runs and tests.
#[derive(Default, Clone)]
pub(crate) struct InMemoryPositionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryPositionStore {
    pub(crate) fn seeded() -> Self {
        let store = Self::default();
        store.insert_position(demo_position());
        store
    }

    pub(crate) fn insert_position(&self, position: Position) {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let highest = member_ids(&position).max().unwrap_or_default();
        guard.last_member_id = guard.last_member_id.max(highest);
        guard.positions.insert(position.id, position);
    }

    pub(crate) fn fetch(&self, id: PositionId) -> Result<Position, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        guard
            .positions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("position {}", id.0)))
    }

    /// Overwrite the scalar fields. Collections change only through member calls.
    pub(crate) fn update_fields(&self, id: PositionId, update: Position) -> Result<(), StoreError> {
        if update.id != id {
            return Err(StoreError::Mismatch(format!(
                "body carries position {} but the path names {}",
                update.id.0, id.0
            )));
        }
        let fields = update.fields();
        if let Some(field) = fields.rejected_field() {
            return Err(StoreError::Invalid(format!("position {field} must not be empty")));
        }

        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let stored = guard
            .positions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("position {}", id.0)))?;
        let collections = (
            std::mem::take(&mut stored.candidates),
            std::mem::take(&mut stored.reviewers),
            std::mem::take(&mut stored.tests),
        );
        *stored = fields.into_position(id, collections.0, collections.1, collections.2);
        Ok(())
    }

    pub(crate) fn create_member(&self, record: MemberRecord) -> Result<MemberRecord, StoreError> {
        let (name, position_id) = match &record {
            MemberRecord::Candidate(candidate) => (&candidate.name, candidate.position_id),
            MemberRecord::Reviewer(reviewer) => (&reviewer.name, reviewer.position_id),
            MemberRecord::TestQuestion(question) => (&question.name, question.position_id),
        };
        if name.trim().is_empty() {
            return Err(StoreError::Invalid(format!(
                "{} name must not be empty",
                record.kind()
            )));
        }

        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if !guard.positions.contains_key(&position_id) {
            return Err(StoreError::NotFound(format!("position {}", position_id.0)));
        }
        guard.last_member_id += 1;
        let id = MemberId(guard.last_member_id);
        let position = guard
            .positions
            .get_mut(&position_id)
            .ok_or_else(|| StoreError::NotFound(format!("position {}", position_id.0)))?;

        let created = match record {
            MemberRecord::Candidate(mut candidate) => {
                candidate.id = id;
                position.candidates.push(candidate.clone());
                MemberRecord::Candidate(candidate)
            }
            MemberRecord::Reviewer(mut reviewer) => {
                reviewer.id = id;
                position.reviewers.push(reviewer.clone());
                MemberRecord::Reviewer(reviewer)
            }
            MemberRecord::TestQuestion(mut question) => {
                question.id = id;
                position.tests.push(question.clone());
                MemberRecord::TestQuestion(question)
            }
        };
        Ok(created)
    }

    pub(crate) fn delete_member(&self, kind: MemberKind, id: MemberId) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let removed = guard.positions.values_mut().any(|position| match kind {
            MemberKind::Candidate => remove_by_id(&mut position.candidates, id, |c| c.id),
            MemberKind::Reviewer => remove_by_id(&mut position.reviewers, id, |r| r.id),
            MemberKind::TestQuestion => remove_by_id(&mut position.tests, id, |q| q.id),
        });

        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("{kind} {}", id.0)))
        }
    }
}

fn remove_by_id<T>(members: &mut Vec<T>, id: MemberId, id_of: impl Fn(&T) -> MemberId) -> bool {
    let before = members.len();
    members.retain(|member| id_of(member) != id);
    members.len() != before
}

fn member_ids(position: &Position) -> impl Iterator<Item = i64> + '_ {
    let candidates = position.candidates.iter().map(|c| c.id.0);
    let reviewers = position.reviewers.iter().map(|r| r.id.0);
    let tests = position.tests.iter().map(|q| q.id.0);
    candidates.chain(reviewers).chain(tests)
}

fn calendar(year: i32, month: u32, day: u32) -> codec::CalendarDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(codec::from_form_date)
        .unwrap_or_default()
}

/// Position 42, the record the stub serves out of the box.
pub(crate) fn demo_position() -> Position {
    let id = PositionId(42);
    Position {
        id,
        number: "ENG-42".to_string(),
        name: "Backend Engineer".to_string(),
        company_info: "Platform team, remote friendly".to_string(),
        instruction: "Answer every question in your own words.".to_string(),
        about: "Own the services behind hiring workflows.".to_string(),
        open_date: calendar(2024, 3, 1),
        close_date: calendar(2024, 4, 1),
        candidates: vec![Candidate {
            id: MemberId(1),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "555-0101".to_string(),
            invitation_date: Some(calendar(2024, 3, 4)),
            expired_date: Some(calendar(2024, 3, 18)),
            position_id: id,
        }],
        reviewers: vec![Reviewer {
            id: MemberId(2),
            name: "Linus Torvalds".to_string(),
            email: "linus@example.com".to_string(),
            number: "R-1".to_string(),
            invitation_date: Some(calendar(2024, 3, 2)),
            position_id: id,
        }],
        tests: vec![TestQuestion {
            id: MemberId(3),
            name: "Reverse a linked list in place.".to_string(),
            time: 900,
            position_id: id,
        }],
    }
}
