//! Raw form values accepted by the synchronizer when adding members.
//!
//! Forms carry calendar dates and free-text inputs; they become wire entities only
//! through [`MemberForm::into_record`], which stamps the owning position.

use chrono::NaiveDate;
use serde::Deserialize;

use super::codec;
use super::domain::{
    Candidate, MemberId, MemberKind, MemberRecord, PositionId, Reviewer, TestQuestion,
};

const SECONDS_PER_MINUTE: u32 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub invitation_date: Option<NaiveDate>,
    #[serde(default)]
    pub expired_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub invitation_date: Option<NaiveDate>,
}

/// Question text plus the answer time in minutes, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TestQuestionForm {
    pub name: String,
    pub time: String,
}

impl TestQuestionForm {
    /// Answer time in seconds, if the minutes input is a whole non-negative number.
    pub fn seconds(&self) -> Option<u32> {
        self.time
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(|minutes| minutes.checked_mul(SECONDS_PER_MINUTE))
    }
}

/// Form values for one new member, tagged by collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberForm {
    Candidate(CandidateForm),
    Reviewer(ReviewerForm),
    TestQuestion(TestQuestionForm),
}

impl MemberForm {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberForm::Candidate(_) => MemberKind::Candidate,
            MemberForm::Reviewer(_) => MemberKind::Reviewer,
            MemberForm::TestQuestion(_) => MemberKind::TestQuestion,
        }
    }

    /// First field whose value is not acceptable, if any.
    pub fn rejected_field(&self) -> Option<&'static str> {
        match self {
            MemberForm::Candidate(form) => required_contact(&form.name, &form.email),
            MemberForm::Reviewer(form) => required_contact(&form.name, &form.email),
            MemberForm::TestQuestion(form) => {
                if form.name.trim().is_empty() {
                    Some("name")
                } else if form.seconds().is_none() {
                    Some("time")
                } else {
                    None
                }
            }
        }
    }

    pub fn is_acceptable(&self) -> bool {
        self.rejected_field().is_none()
    }

    /// Build the unconfirmed entity owned by `position_id`.
    ///
    /// Callers validate first; an unparseable answer time falls back to zero here.
    pub fn into_record(self, position_id: PositionId) -> MemberRecord {
        match self {
            MemberForm::Candidate(form) => MemberRecord::Candidate(Candidate {
                id: MemberId::UNASSIGNED,
                name: form.name.trim().to_string(),
                email: form.email.trim().to_string(),
                phone: form.phone.trim().to_string(),
                invitation_date: form.invitation_date.map(codec::from_form_date),
                expired_date: form.expired_date.map(codec::from_form_date),
                position_id,
            }),
            MemberForm::Reviewer(form) => MemberRecord::Reviewer(Reviewer {
                id: MemberId::UNASSIGNED,
                name: form.name.trim().to_string(),
                email: form.email.trim().to_string(),
                number: form.number.trim().to_string(),
                invitation_date: form.invitation_date.map(codec::from_form_date),
                position_id,
            }),
            MemberForm::TestQuestion(form) => {
                let time = form.seconds().unwrap_or_default();
                MemberRecord::TestQuestion(TestQuestion {
                    id: MemberId::UNASSIGNED,
                    name: form.name.trim().to_string(),
                    time,
                    position_id,
                })
            }
        }
    }
}

fn required_contact(name: &str, email: &str) -> Option<&'static str> {
    if name.trim().is_empty() {
        Some("name")
    } else if !is_valid_email(email) {
        Some("email")
    } else {
        None
    }
}

/// Loose address check: one `@`, non-empty local part and domain, no whitespace.
pub fn is_valid_email(raw: &str) -> bool {
    let candidate = raw.trim();
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    match candidate.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}
