//! Coaching backend client
//!
//! Thin HTTP+JSON client for the `/api/rik` endpoints consumed by the
//! assistant session. Every call is a single attempt: no retries, no auth
//! header. Any transport failure or non-2xx status is an error.

mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

pub use types::{
    ChatReply, ChatRequest, LearnedRoutine, MorningBriefing, ScheduleRequest, ScheduleSummary,
    SessionStatus,
};

use crate::config::Config;
use crate::session::Mode;
use crate::{Error, Result};

/// Remote operations the session controller depends on
///
/// Implemented over HTTP by [`RikClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the user's status summary
    async fn status(&self) -> Result<SessionStatus>;

    /// Send one chat turn with the given conversational context
    async fn chat(&self, message: &str, context: Mode) -> Result<ChatReply>;

    /// Generate the schedule for `date` (`YYYY-MM-DD`)
    async fn generate_schedule(&self, date: &str) -> Result<ScheduleSummary>;

    /// Ask the backend to learn the routine from the recent conversation
    async fn learn_routine(&self) -> Result<LearnedRoutine>;

    /// Fetch today's morning briefing
    async fn morning_briefing(&self) -> Result<MorningBriefing>;
}

/// HTTP client for the coaching backend
#[derive(Debug, Clone)]
pub struct RikClient {
    /// HTTP client
    client: Client,
    /// Base URL without a trailing slash
    base_url: String,
    /// User the requests act on behalf of
    user_id: String,
}

impl RikClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
        })
    }

    /// Create a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.server.base_url.clone(),
            config.user_id.clone(),
            config.server.request_timeout,
        )
    }

    /// User the client acts for
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/rik/{path}", self.base_url)
    }

    fn user_segment(&self) -> String {
        urlencoding::encode(&self.user_id).into_owned()
    }
}

#[async_trait]
impl Backend for RikClient {
    async fn status(&self) -> Result<SessionStatus> {
        let url = self.url(&format!("status/{}", self.user_segment()));
        tracing::debug!(%url, "fetching session status");

        let response = self.client.get(&url).send().await?;
        parse_json(response).await
    }

    async fn chat(&self, message: &str, context: Mode) -> Result<ChatReply> {
        let request = ChatRequest {
            user_id: self.user_id.clone(),
            message: message.to_string(),
            context,
        };
        tracing::debug!(context = %context, message_len = message.len(), "dispatching chat turn");

        let response = self
            .client
            .post(self.url("chat"))
            .json(&request)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn generate_schedule(&self, date: &str) -> Result<ScheduleSummary> {
        let request = ScheduleRequest {
            user_id: self.user_id.clone(),
            date: date.to_string(),
        };
        tracing::debug!(date, "requesting schedule generation");

        let response = self
            .client
            .post(self.url("generate-smart-schedule"))
            .json(&request)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn learn_routine(&self) -> Result<LearnedRoutine> {
        tracing::debug!("requesting routine learning");

        let response = self
            .client
            .post(self.url("learn-routine"))
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await?;
        parse_json(response).await
    }

    async fn morning_briefing(&self) -> Result<MorningBriefing> {
        let url = self.url(&format!("morning-briefing/{}", self.user_segment()));
        tracing::debug!(%url, "fetching morning briefing");

        let response = self.client.get(&url).send().await?;
        parse_json(response).await
    }
}

/// Turn a response into `T`, treating any non-2xx status as an error
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
