//! HTTP backend for the project service.
//!
//! All wire types live in [`super::wire`]; this module only builds requests,
//! classifies failures and forwards bodies to the normalisers. No timeout or
//! retry is configured: a transport failure surfaces on the first attempt.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::models::{Confirmation, FileHandle, NewProject, PingStatus, Project, ProjectId, Upload};

use super::{wire, ChatReply, TokenGrant};

/// Adapter for the project service REST API.
///
/// Constructed once, then cheaply cloned because `reqwest::Client` is an
/// `Arc` internally.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Transport(format!("base url cannot carry a path: {base_url}")));
        }
        let client = Client::builder()
            .user_agent(concat!("projchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    /// Join percent-encoded path segments onto the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Transport(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send, then split the outcome into transport / API / decode failures.
    async fn execute(&self, request: RequestBuilder, endpoint: &'static str) -> Result<Value, ClientError> {
        let response = request.send().await.map_err(|e| {
            warn!(endpoint, error = %e, "request failed (transport)");
            ClientError::Transport(e.to_string())
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(format!("{endpoint}: reading body failed: {e}")))?;
        trace!(endpoint, status = status.as_u16(), body_len = bytes.len(), "response received");

        if !status.is_success() {
            let detail = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .as_ref()
                .and_then(wire::detail)
                .unwrap_or_else(|| {
                    let text = String::from_utf8_lossy(&bytes).trim().to_string();
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        text
                    }
                });
            debug!(endpoint, status = status.as_u16(), %detail, "service returned failure");
            return Err(ClientError::Api { status: status.as_u16(), detail });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(format!("{endpoint}: {e}")))
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Confirmation, ClientError> {
        let request = self
            .client
            .post(self.url(&["register"])?)
            .json(&json!({ "email": email, "password": password }));
        let body = self.execute(request, "register").await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenGrant, ClientError> {
        let request = self
            .client
            .post(self.url(&["token"])?)
            .form(&[("username", email), ("password", password)]);
        match self.execute(request, "token").await {
            Ok(body) => wire::token_grant(body),
            Err(ClientError::Api { status, detail }) if (400..500).contains(&status) => {
                Err(ClientError::InvalidCredentials(detail))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_projects(&self, token: &str) -> Result<Vec<Project>, ClientError> {
        let request = self.client.get(self.url(&["projects"])?).bearer_auth(token);
        let body = self.execute(request, "list_projects").await?;
        wire::collection(body)
    }

    pub async fn create_project(&self, token: &str, project: &NewProject) -> Result<Project, ClientError> {
        let request = self
            .client
            .post(self.url(&["projects"])?)
            .bearer_auth(token)
            .json(project);
        let body = self.execute(request, "create_project").await?;
        wire::entity(body)
    }

    pub async fn delete_project(&self, token: &str, id: ProjectId) -> Result<Confirmation, ClientError> {
        let id = id.to_string();
        let request = self.client.delete(self.url(&["projects", &id])?).bearer_auth(token);
        let body = self.execute(request, "delete_project").await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn send_chat(&self, token: &str, id: ProjectId, message: &str) -> Result<ChatReply, ClientError> {
        let request = self
            .client
            .post(self.url(&["chat"])?)
            .bearer_auth(token)
            .json(&json!({ "project_id": id, "message": message }));
        let body = self.execute(request, "send_chat").await?;
        wire::chat_reply(body)
    }

    pub async fn reset_chat(&self, token: &str, id: ProjectId) -> Result<Confirmation, ClientError> {
        let id = id.to_string();
        let request = self
            .client
            .delete(self.url(&["projects", &id, "chat"])?)
            .bearer_auth(token);
        let body = self.execute(request, "reset_chat").await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn upload_file(&self, token: &str, id: ProjectId, upload: &Upload) -> Result<Confirmation, ClientError> {
        let mut part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
        if let Some(mime) = &upload.mime {
            part = part
                .mime_str(mime)
                .map_err(|_| ClientError::Validation { field: "mime" })?;
        }
        let id = id.to_string();
        let request = self
            .client
            .post(self.url(&["projects", &id, "upload"])?)
            .bearer_auth(token)
            .multipart(Form::new().part("file", part));
        let body = self.execute(request, "upload_file").await?;
        Ok(wire::confirmation(&body))
    }

    /// The service addresses attachments by their position in the project's
    /// file list, so the handle is resolved against a fresh listing first.
    pub async fn delete_file(&self, token: &str, id: ProjectId, handle: &FileHandle) -> Result<Confirmation, ClientError> {
        let projects = self.list_projects(token).await?;
        let index = file_index(&projects, id, handle)?.to_string();
        debug!(project = %id, file = %handle, index = %index, "resolved file handle");
        let id = id.to_string();
        let request = self
            .client
            .delete(self.url(&["projects", &id, "files", &index])?)
            .bearer_auth(token);
        let body = self.execute(request, "delete_file").await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn ping(&self) -> Result<PingStatus, ClientError> {
        let request = self.client.get(self.url(&["ping"])?);
        let body = self.execute(request, "ping").await?;
        Ok(wire::ping(&body))
    }
}

/// Position of `handle` in project `id`'s file list, or the 404 the service
/// would give for it.
fn file_index(projects: &[Project], id: ProjectId, handle: &FileHandle) -> Result<usize, ClientError> {
    let not_found = |detail: &str| ClientError::Api { status: 404, detail: detail.to_string() };
    let project = projects
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| not_found("Project not found"))?;
    project
        .files
        .iter()
        .position(|f| f.name == handle.name())
        .ok_or_else(|| not_found("File not found"))
}
