//! `reqwest` binding of the [`Gateway`] surface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::{
    AppConfig, Gateway, GatewayError, GatewayResult, Habit, HabitDraft, HabitLog, HabitPatch,
    HabitWithStats, Task, TaskDraft, TaskPatch,
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::token::TokenStore;

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

#[derive(Serialize)]
struct LogBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn from_config(config: &AppConfig, tokens: Arc<TokenStore>) -> Result<Self, GatewayError> {
        Self::new(config.api_url(), config.request_timeout(), tokens)
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match self.tokens.get() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> GatewayResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "gateway response");
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Unauthenticated);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.message)
            .unwrap_or(body);
        warn!(status = status.as_u16(), message = %message, "gateway call failed");
        Err(GatewayError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> GatewayResult<T> {
        let response = self.send(builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_tasks(&self) -> GatewayResult<Vec<Task>> {
        self.fetch(self.request(Method::GET, "/tasks")).await
    }

    async fn list_tasks_by_project(&self, project_id: &str) -> GatewayResult<Vec<Task>> {
        self.fetch(
            self.request(Method::GET, "/tasks")
                .query(&[("projectId", project_id)]),
        )
        .await
    }

    async fn list_tasks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Task>> {
        self.fetch(
            self.request(Method::GET, "/tasks/calendar")
                .query(&[("start", timestamp(start)), ("end", timestamp(end))]),
        )
        .await
    }

    async fn create_task(&self, draft: &TaskDraft) -> GatewayResult<Task> {
        self.fetch(self.request(Method::POST, "/tasks").json(draft))
            .await
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> GatewayResult<Task> {
        self.fetch(self.request(Method::PUT, &format!("/tasks/{id}")).json(patch))
            .await
    }

    async fn delete_task(&self, id: &str) -> GatewayResult<Task> {
        self.fetch(self.request(Method::DELETE, &format!("/tasks/{id}")))
            .await
    }

    async fn list_habits_with_stats(&self) -> GatewayResult<Vec<HabitWithStats>> {
        self.fetch(self.request(Method::GET, "/habits/stats")).await
    }

    async fn create_habit(&self, draft: &HabitDraft) -> GatewayResult<Habit> {
        self.fetch(self.request(Method::POST, "/habits").json(draft))
            .await
    }

    async fn update_habit(&self, id: &str, patch: &HabitPatch) -> GatewayResult<Habit> {
        self.fetch(self.request(Method::PUT, &format!("/habits/{id}")).json(patch))
            .await
    }

    async fn delete_habit(&self, id: &str) -> GatewayResult<()> {
        self.send(self.request(Method::DELETE, &format!("/habits/{id}")))
            .await
            .map(|_| ())
    }

    async fn log_habit(
        &self,
        id: &str,
        date: Option<DateTime<Utc>>,
        completed: Option<bool>,
    ) -> GatewayResult<HabitLog> {
        let body = LogBody {
            date: date.map(timestamp),
            completed,
        };
        self.fetch(
            self.request(Method::POST, &format!("/habits/{id}/log"))
                .json(&body),
        )
        .await
    }

    async fn list_habit_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<HabitLog>> {
        self.fetch(
            self.request(Method::GET, "/habits/logs")
                .query(&[("startDate", timestamp(start)), ("endDate", timestamp(end))]),
        )
        .await
    }
}
