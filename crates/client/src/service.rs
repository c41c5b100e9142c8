// Copyright 2025 LLM EvalBench Contributors
// SPDX-License-Identifier: Apache-2.0

//! The execution service: the remote system that runs test tasks.
//!
//! [`ExecutionService`] lists every call the client makes. The service owns
//! task status; the client forwards commands and merges what comes back.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | create | `POST /tests` |
//! | start | `POST /tests/tasks/{id}/start` |
//! | stop | `POST /tests/tasks/{id}/stop` |
//! | retry | `POST /tests/tasks/{id}/retry` |
//! | delete | `DELETE /tests/tasks/{id}` |
//! | list | `GET /tests/tasks?status=` |
//! | get | `GET /tests/tasks/{id}` |
//! | progress | `GET /tests/{id}/progress` |
//! | results | `GET /tests/{id}/results` |

use crate::config::ClientConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use llm_evalbench_core::{
    ModelResult, ProgressSnapshot, RawResultSet, TaskId, TaskStatus, TestTask, ValidatedSpec,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

/// Calls the client makes against the execution service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submit a new task. The service answers with the created record.
    async fn create_task(&self, spec: &ValidatedSpec) -> Result<TestTask>;

    /// Start a pending task. `None` when the service acknowledges without a
    /// record.
    async fn start_task(&self, id: &TaskId) -> Result<Option<TestTask>>;

    /// Ask the service to stop a task.
    async fn stop_task(&self, id: &TaskId) -> Result<Option<TestTask>>;

    /// Put a failed or cancelled task back into the queue.
    async fn retry_task(&self, id: &TaskId) -> Result<Option<TestTask>>;

    /// Delete a finished task.
    async fn delete_task(&self, id: &TaskId) -> Result<()>;

    /// List tasks, optionally restricted to one status.
    async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TestTask>>;

    /// Fetch one task record.
    async fn get_task(&self, id: &TaskId) -> Result<TestTask>;

    /// Fetch the progress of a running task.
    async fn task_progress(&self, id: &TaskId) -> Result<ProgressSnapshot>;

    /// Fetch the results of a finished task.
    async fn task_results(&self, id: &TaskId) -> Result<RawResultSet>;
}

/// Results arrive either wrapped with their task ID or as a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResultsBody {
    Set(RawResultSet),
    List(Vec<ModelResult>),
}

/// [`ExecutionService`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpExecutionService {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpExecutionService {
    /// Build a client from configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// API root requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        trace!(url = %response.url(), status = status.as_u16(), "Execution service responded");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn body(response: Response) -> Result<Vec<u8>> {
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = Self::body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Command endpoints answer with either the updated record or a plain
    /// acknowledgement.
    async fn optional_record(response: Response) -> Result<Option<TestTask>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = Self::body(response).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        match serde_json::from_slice::<TestTask>(&body) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                debug!(error = %e, "Command response carried no task record");
                Ok(None)
            }
        }
    }

    async fn command(&self, id: &TaskId, action: &str) -> Result<Option<TestTask>> {
        let path = format!("tests/tasks/{}/{}", id, action);
        let response = self.send(self.request(Method::POST, &path)).await?;
        Self::optional_record(response).await
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_decode() {
        return Error::Decode(err.to_string());
    }
    // Connect failures, timeouts and dropped connections are all worth
    // another try.
    Error::transient(err.to_string())
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = error_message(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::transient(format!("{}: {}", status, message))
    } else {
        Error::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Pull the human-readable part out of an error body (`{"detail": ...}`).
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "message", alias = "error")]
        detail: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn create_task(&self, spec: &ValidatedSpec) -> Result<TestTask> {
        let response = self
            .send(self.request(Method::POST, "tests").json(spec))
            .await?;
        Self::json(response).await
    }

    async fn start_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        self.command(id, "start").await
    }

    async fn stop_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        self.command(id, "stop").await
    }

    async fn retry_task(&self, id: &TaskId) -> Result<Option<TestTask>> {
        self.command(id, "retry").await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<()> {
        let path = format!("tests/tasks/{}", id);
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TestTask>> {
        let mut builder = self.request(Method::GET, "tests/tasks");
        if let Some(status) = status {
            builder = builder.query(&[("status", status.as_str())]);
        }
        let response = self.send(builder).await?;
        Self::json(response).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<TestTask> {
        let path = format!("tests/tasks/{}", id);
        let response = self.send(self.request(Method::GET, &path)).await?;
        Self::json(response).await
    }

    async fn task_progress(&self, id: &TaskId) -> Result<ProgressSnapshot> {
        let path = format!("tests/{}/progress", id);
        let response = self.send(self.request(Method::GET, &path)).await?;
        Self::json(response).await
    }

    async fn task_results(&self, id: &TaskId) -> Result<RawResultSet> {
        let path = format!("tests/{}/results", id);
        let response = match self.send(self.request(Method::GET, &path)).await {
            Ok(response) => response,
            Err(Error::Rejected { status: 404, .. }) => return Err(Error::not_ready(id)),
            Err(e) => return Err(e),
        };
        if response.status() == StatusCode::ACCEPTED {
            return Err(Error::not_ready(id));
        }
        let body = Self::body(response).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::not_ready(id));
        }
        decode_results(id, &body)
    }
}

fn decode_results(id: &TaskId, body: &[u8]) -> Result<RawResultSet> {
    Ok(match serde_json::from_slice::<ResultsBody>(body)? {
        ResultsBody::Set(set) if &set.task_id == id => set,
        ResultsBody::Set(set) => {
            return Err(Error::Decode(format!(
                "results for task {} returned for task {}",
                set.task_id, id
            )))
        }
        ResultsBody::List(model_results) => RawResultSet::new(id.clone(), model_results),
    })
}
