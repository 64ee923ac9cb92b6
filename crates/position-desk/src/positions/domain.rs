use serde::{Deserialize, Deserializer, Serialize};

use super::codec::{self, CalendarDateTime};

/// Identifier of a position (job opening) on the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub i64);

/// Server-assigned identifier of a candidate, reviewer, or test question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl MemberId {
    /// Placeholder carried by members the remote service has not confirmed yet.
    pub const UNASSIGNED: MemberId = MemberId(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

/// The three dependent collections owned by a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Candidate,
    Reviewer,
    TestQuestion,
}

impl MemberKind {
    pub fn label(&self) -> &'static str {
        match self {
            MemberKind::Candidate => "candidate",
            MemberKind::Reviewer => "reviewer",
            MemberKind::TestQuestion => "test question",
        }
    }

    /// Collection segment used by the remote REST surface.
    pub fn collection_path(&self) -> &'static str {
        match self {
            MemberKind::Candidate => "candidats",
            MemberKind::Reviewer => "viewers",
            MemberKind::TestQuestion => "tests",
        }
    }
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The position aggregate exactly as the remote service exchanges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub company_info: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub about: String,
    #[serde(default, with = "codec::epoch_seconds")]
    pub open_date: CalendarDateTime,
    #[serde(default, with = "codec::epoch_seconds")]
    pub close_date: CalendarDateTime,
    #[serde(rename = "candidats", default, deserialize_with = "null_as_empty")]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "viewers", default, deserialize_with = "null_as_empty")]
    pub reviewers: Vec<Reviewer>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tests: Vec<TestQuestion>,
}

impl Position {
    pub fn fields(&self) -> PositionFields {
        PositionFields {
            number: self.number.clone(),
            name: self.name.clone(),
            company_info: self.company_info.clone(),
            instruction: self.instruction.clone(),
            about: self.about.clone(),
            open_date: self.open_date,
            close_date: self.close_date,
        }
    }
}

/// Editable scalar fields of a position, in calendar form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFields {
    pub number: String,
    pub name: String,
    pub company_info: String,
    pub instruction: String,
    pub about: String,
    pub open_date: CalendarDateTime,
    pub close_date: CalendarDateTime,
}

impl PositionFields {
    /// First required field that is blank, if any.
    pub fn rejected_field(&self) -> Option<&'static str> {
        if self.number.trim().is_empty() {
            Some("number")
        } else if self.name.trim().is_empty() {
            Some("name")
        } else {
            None
        }
    }

    pub fn is_acceptable(&self) -> bool {
        self.rejected_field().is_none()
    }

    /// Rebuild the wire aggregate from these fields and the given collections.
    pub fn into_position(
        self,
        id: PositionId,
        candidates: Vec<Candidate>,
        reviewers: Vec<Reviewer>,
        tests: Vec<TestQuestion>,
    ) -> Position {
        Position {
            id,
            number: self.number,
            name: self.name,
            company_info: self.company_info,
            instruction: self.instruction,
            about: self.about,
            open_date: self.open_date,
            close_date: self.close_date,
            candidates,
            reviewers,
            tests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, with = "codec::epoch_seconds_option")]
    pub invitation_date: Option<CalendarDateTime>,
    #[serde(default, with = "codec::epoch_seconds_option")]
    pub expired_date: Option<CalendarDateTime>,
    #[serde(default)]
    pub position_id: PositionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    #[serde(default)]
    pub id: MemberId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub number: String,
    #[serde(default, with = "codec::epoch_seconds_option")]
    pub invitation_date: Option<CalendarDateTime>,
    #[serde(default)]
    pub position_id: PositionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestQuestion {
    #[serde(default)]
    pub id: MemberId,
    pub name: String,
    /// Allotted answer time in seconds.
    pub time: u32,
    #[serde(default)]
    pub position_id: PositionId,
}

/// Shared surface of the dependent-collection entities.
pub trait Member: Clone {
    const KIND: MemberKind;

    fn id(&self) -> MemberId;
    fn set_id(&mut self, id: MemberId);
    fn position_id(&self) -> PositionId;
}

impl Member for Candidate {
    const KIND: MemberKind = MemberKind::Candidate;

    fn id(&self) -> MemberId {
        self.id
    }

    fn set_id(&mut self, id: MemberId) {
        self.id = id;
    }

    fn position_id(&self) -> PositionId {
        self.position_id
    }
}

impl Member for Reviewer {
    const KIND: MemberKind = MemberKind::Reviewer;

    fn id(&self) -> MemberId {
        self.id
    }

    fn set_id(&mut self, id: MemberId) {
        self.id = id;
    }

    fn position_id(&self) -> PositionId {
        self.position_id
    }
}

impl Member for TestQuestion {
    const KIND: MemberKind = MemberKind::TestQuestion;

    fn id(&self) -> MemberId {
        self.id
    }

    fn set_id(&mut self, id: MemberId) {
        self.id = id;
    }

    fn position_id(&self) -> PositionId {
        self.position_id
    }
}

/// A dependent-collection entity of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRecord {
    Candidate(Candidate),
    Reviewer(Reviewer),
    TestQuestion(TestQuestion),
}

impl MemberRecord {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberRecord::Candidate(_) => MemberKind::Candidate,
            MemberRecord::Reviewer(_) => MemberKind::Reviewer,
            MemberRecord::TestQuestion(_) => MemberKind::TestQuestion,
        }
    }

    pub fn id(&self) -> MemberId {
        match self {
            MemberRecord::Candidate(candidate) => candidate.id,
            MemberRecord::Reviewer(reviewer) => reviewer.id,
            MemberRecord::TestQuestion(question) => question.id,
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
