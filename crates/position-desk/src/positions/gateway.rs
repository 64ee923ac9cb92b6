use async_trait::async_trait;

use super::domain::{Candidate, MemberId, MemberKind, Position, PositionId, Reviewer, TestQuestion};

/// Failure reported by the remote positions service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("rejected by the positions service: {0}")]
    ValidationRejected(String),
}

/// Remote persistence for a position and its dependent collections.
///
/// Every call is independently fallible; implementations must not retry on their own.
#[async_trait]
pub trait PositionGateway: Send + Sync {
    async fn fetch_position(&self, id: PositionId) -> Result<Position, GatewayError>;

    /// Send the full aggregate snapshot carrying the edited fields.
    async fn persist_position_fields(&self, position: &Position) -> Result<(), GatewayError>;

    async fn create_candidate(&self, candidate: &Candidate) -> Result<MemberId, GatewayError>;

    async fn create_reviewer(&self, reviewer: &Reviewer) -> Result<MemberId, GatewayError>;

    async fn create_test_question(
        &self,
        question: &TestQuestion,
    ) -> Result<MemberId, GatewayError>;

    async fn delete_member(&self, kind: MemberKind, id: MemberId) -> Result<(), GatewayError>;
}
