//! # BOSH Director Client
//!
//! HTTP implementation of [`DeploymentGateway`]. Deploys and deletes answer with a
//! redirect to the task that tracks them; redirects are not followed, the task id is
//! read straight from the `Location` header.

use super::{DeploymentGateway, EnvironmentInfo, GatewayError, GatewayResult, Task, TaskId};
use crate::config::{BoshConfig, ConfigResult, ConfigurationError};
use crate::state_machine::TaskState;
use async_trait::async_trait;
use reqwest::{header, redirect, Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct BoshTask {
    id: u64,
    state: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<BoshTask> for Task {
    fn from(task: BoshTask) -> Self {
        Self {
            id: TaskId::new(task.id.to_string()),
            state: TaskState::from(task.state.as_str()),
            description: task.description,
        }
    }
}

#[derive(Clone)]
pub struct BoshGateway {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl std::fmt::Debug for BoshGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoshGateway")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .finish()
    }
}

impl BoshGateway {
    pub fn new(config: &BoshConfig) -> ConfigResult<Self> {
        let base_url = Url::parse(&config.address).map_err(|e| {
            ConfigurationError::invalid_value("bosh.address", config.address.clone(), e.to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .danger_accept_invalid_certs(config.skip_ssl_validation)
            .redirect(redirect::Policy::none())
            .user_agent(format!("blacksmith/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::validation_error(format!("Failed to create BOSH client: {e}"))
            })?;

        info!(base_url = %base_url, "Created BOSH director client");

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> GatewayResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::invalid_response(format!("bad URL for {path}: {e}")))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    async fn task_from_redirect(response: Response) -> GatewayResult<TaskId> {
        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| GatewayError::invalid_response("redirect without Location header"))?;
            return task_id_from_location(location).ok_or_else(|| {
                GatewayError::invalid_response(format!("no task id in Location '{location}'"))
            });
        }
        Err(rejection(response).await)
    }
}

/// Extract the task id from a director redirect such as `https://10.0.0.6/tasks/42`
pub(crate) fn task_id_from_location(location: &str) -> Option<TaskId> {
    let path = location.split(['?', '#']).next()?;
    let mut segments = path.trim_end_matches('/').rsplit('/');
    let id = segments.next()?;
    if segments.next()? != "tasks" || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(TaskId::new(id))
}

async fn rejection(response: Response) -> GatewayError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if status.is_server_error() {
        GatewayError::Unavailable {
            reason: format!("HTTP {status}: {message}"),
        }
    } else {
        GatewayError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl DeploymentGateway for BoshGateway {
    async fn environment_info(&self) -> GatewayResult<EnvironmentInfo> {
        let url = self.url("/info")?;
        let response = self.authorized(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<EnvironmentInfo>().await?)
    }

    async fn submit_deployment(&self, manifest: &str) -> GatewayResult<TaskId> {
        let url = self.url("/deployments")?;
        debug!(url = %url, bytes = manifest.len(), "Submitting deployment manifest");
        let response = self
            .authorized(self.client.post(url))
            .header(header::CONTENT_TYPE, "text/yaml")
            .body(manifest.to_string())
            .send()
            .await?;
        Self::task_from_redirect(response).await
    }

    async fn submit_teardown(&self, deployment: &str) -> GatewayResult<TaskId> {
        let mut url = self.url("/deployments/")?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::invalid_response("director URL cannot be a base"))?
            .pop_if_empty()
            .push(deployment);
        debug!(url = %url, deployment = %deployment, "Submitting deployment teardown");
        let response = self.authorized(self.client.delete(url)).send().await?;
        Self::task_from_redirect(response).await
    }

    async fn poll_task(&self, task_id: &TaskId) -> GatewayResult<Task> {
        let mut url = self.url("/tasks/")?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::invalid_response("director URL cannot be a base"))?
            .pop_if_empty()
            .push(task_id.as_str());
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound {
                what: format!("task {task_id}"),
            });
        }
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json::<BoshTask>().await?.into())
    }
}
