//! REST adapter for the remote positions service.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Candidate, MemberId, MemberKind, Position, PositionId, Reviewer, TestQuestion};
use super::gateway::{GatewayError, PositionGateway};
use crate::config::GatewayConfig;

/// Body returned by the service after creating a collection member.
#[derive(Debug, Deserialize)]
struct CreatedMember {
    id: MemberId,
}

/// [`PositionGateway`] speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPositionGateway {
    client: Client,
    base_url: String,
}

impl HttpPositionGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn create<T: Serialize + Sync>(
        &self,
        kind: MemberKind,
        member: &T,
    ) -> Result<MemberId, GatewayError> {
        let url = self.url(kind.collection_path());
        debug!(%url, %kind, "creating member");
        let response = self
            .client
            .post(&url)
            .json(member)
            .send()
            .await
            .map_err(|err| transport("POST", &url, err))?;

        let created: CreatedMember = ensure_success(response, &url)
            .await?
            .json()
            .await
            .map_err(|err| transport("decode", &url, err))?;
        Ok(created.id)
    }
}

#[async_trait]
impl PositionGateway for HttpPositionGateway {
    async fn fetch_position(&self, id: PositionId) -> Result<Position, GatewayError> {
        let url = self.url(&format!("positions/{}", id.0));
        debug!(%url, "fetching position");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| transport("GET", &url, err))?;

        ensure_success(response, &url)
            .await?
            .json::<Position>()
            .await
            .map_err(|err| transport("decode", &url, err))
    }

    async fn persist_position_fields(&self, position: &Position) -> Result<(), GatewayError> {
        let url = self.url(&format!("positions/{}", position.id.0));
        debug!(%url, "persisting position fields");
        let response = self
            .client
            .put(&url)
            .json(position)
            .send()
            .await
            .map_err(|err| transport("PUT", &url, err))?;

        ensure_success(response, &url).await.map(|_| ())
    }

    async fn create_candidate(&self, candidate: &Candidate) -> Result<MemberId, GatewayError> {
        self.create(MemberKind::Candidate, candidate).await
    }

    async fn create_reviewer(&self, reviewer: &Reviewer) -> Result<MemberId, GatewayError> {
        self.create(MemberKind::Reviewer, reviewer).await
    }

    async fn create_test_question(
        &self,
        question: &TestQuestion,
    ) -> Result<MemberId, GatewayError> {
        self.create(MemberKind::TestQuestion, question).await
    }

    async fn delete_member(&self, kind: MemberKind, id: MemberId) -> Result<(), GatewayError> {
        let url = self.url(&format!("{}/{}", kind.collection_path(), id.0));
        debug!(%url, %kind, "deleting member");
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|err| transport("DELETE", &url, err))?;

        ensure_success(response, &url).await.map(|_| ())
    }
}

fn transport(action: &str, url: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(format!("{action} {url} failed: {err}"))
}

async fn ensure_success(response: Response, url: &str) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(url.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            GatewayError::ValidationRejected(body)
        }
        other => GatewayError::Transport(format!("{url} answered {other}: {body}")),
    })
}
