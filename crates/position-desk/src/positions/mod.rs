//! Position aggregate editing: the data model, time conversion at the wire boundary,
//! the remote gateway seam, and the optimistic synchronizer that ties them together.

pub mod busy;
pub mod codec;
pub mod domain;
pub mod forms;
pub mod gateway;
pub mod http;
pub mod members;
pub mod synchronizer;

#[cfg(test)]
mod tests;

pub use busy::{BusyState, MutationId, MutationTicket, RequestState};
pub use codec::CalendarDateTime;
pub use domain::{
    Candidate, Member, MemberId, MemberKind, MemberRecord, Position, PositionFields, PositionId,
    Reviewer, TestQuestion,
};
pub use forms::{CandidateForm, MemberForm, ReviewerForm, TestQuestionForm};
pub use gateway::{GatewayError, PositionGateway};
pub use http::HttpPositionGateway;
pub use members::{Entry, EntryKey, MemberList};
pub use synchronizer::{MutationAction, PositionSynchronizer, SlotState, SyncError, SyncEvent};
