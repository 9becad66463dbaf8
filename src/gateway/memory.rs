//! In-process project service.
//!
//! Emulates the remote service (users, per-owner projects with sequential ids,
//! echo chat replies) and answers with the same JSON bodies the HTTP service
//! produces, which then go through the shared normalisers in [`super::wire`].
//! Used for offline runs (`base_url = "memory://"`) and to drive ordering tests:
//! latency and one-shot failures can be queued per endpoint. The response is
//! computed when the call is issued and delivered after the queued latency,
//! like a reply held up on the network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::models::{Confirmation, FileHandle, Message, NewProject, PingStatus, Project, ProjectId, Upload};
use crate::sync::lock;

use super::{wire, ChatReply, TokenGrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Register,
    Login,
    ListProjects,
    CreateProject,
    DeleteProject,
    SendChat,
    ResetChat,
    UploadFile,
    DeleteFile,
    Ping,
}

/// How the list endpoint wraps its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListShape {
    #[default]
    Bare,
    Items,
    Projects,
}

/// What the chat endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatShape {
    #[default]
    History,
    ReplyOnly,
}

#[derive(Debug)]
struct StoredProject {
    owner: String,
    name: String,
    description: Option<String>,
    files: Vec<String>,
    chat: Vec<Message>,
}

#[derive(Debug, Default)]
struct Service {
    users: HashMap<String, String>,
    tokens: HashMap<String, String>,
    projects: BTreeMap<i64, StoredProject>,
    last_id: i64,
    list_shape: ListShape,
    chat_shape: ChatShape,
    latency: HashMap<Endpoint, VecDeque<Duration>>,
    failures: HashMap<Endpoint, VecDeque<ClientError>>,
    calls: Vec<Endpoint>,
}

fn api(status: u16, detail: &str) -> ClientError {
    ClientError::Api { status, detail: detail.to_string() }
}

impl Service {
    fn owned_mut(&mut self, owner: &str, id: ProjectId) -> Result<&mut StoredProject, ClientError> {
        self.projects
            .get_mut(&id.0)
            .filter(|p| p.owner == owner)
            .ok_or_else(|| api(404, "Project not found"))
    }

    fn project_json(id: i64, p: &StoredProject) -> Value {
        let files: Vec<Value> = p.files.iter().map(|f| json!({ "filename": f })).collect();
        json!({ "id": id, "name": p.name, "description": p.description, "files": files })
    }
}

/// Cheaply cloneable handle; clones share one emulated service.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Mutex<Service>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list_shape(self, shape: ListShape) -> Self {
        lock(&self.inner).list_shape = shape;
        self
    }

    pub fn with_chat_shape(self, shape: ChatShape) -> Self {
        self.set_chat_shape(shape);
        self
    }

    pub fn set_chat_shape(&self, shape: ChatShape) {
        lock(&self.inner).chat_shape = shape;
    }

    /// Hold the next response of `endpoint` back for `delay`.
    pub fn delay_next(&self, endpoint: Endpoint, delay: Duration) {
        lock(&self.inner).latency.entry(endpoint).or_default().push_back(delay);
    }

    /// Fail the next call of `endpoint` with `error`, without touching state.
    pub fn fail_next(&self, endpoint: Endpoint, error: ClientError) {
        lock(&self.inner).failures.entry(endpoint).or_default().push_back(error);
    }

    /// Invalidate every issued token, as a server-side expiry would.
    pub fn expire_tokens(&self) {
        lock(&self.inner).tokens.clear();
    }

    pub fn calls(&self) -> Vec<Endpoint> {
        lock(&self.inner).calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        lock(&self.inner).calls.iter().filter(|e| **e == endpoint).count()
    }

    /// Server-side file names of a project, in service order.
    pub fn files_of(&self, id: ProjectId) -> Option<Vec<String>> {
        lock(&self.inner).projects.get(&id.0).map(|p| p.files.clone())
    }

    /// Server-side chat history of a project.
    pub fn history_of(&self, id: ProjectId) -> Option<Vec<Message>> {
        lock(&self.inner).projects.get(&id.0).map(|p| p.chat.clone())
    }

    /// Run one emulated request: record it, apply any queued failure, check
    /// the bearer token, compute the body, then wait out any queued latency.
    async fn call<F>(&self, endpoint: Endpoint, token: Option<&str>, handler: F) -> Result<Value, ClientError>
    where
        F: FnOnce(&mut Service, &str) -> Result<Value, ClientError>,
    {
        let (outcome, delay) = {
            let mut svc = lock(&self.inner);
            svc.calls.push(endpoint);
            let delay = svc.latency.get_mut(&endpoint).and_then(VecDeque::pop_front);
            let injected = svc.failures.get_mut(&endpoint).and_then(VecDeque::pop_front);
            let outcome = match injected {
                Some(err) => Err(err),
                None => match token {
                    None => handler(&mut *svc, ""),
                    Some(t) => match svc.tokens.get(t).cloned() {
                        Some(user) => handler(&mut *svc, &user),
                        None => Err(api(401, "Invalid or expired token")),
                    },
                },
            };
            (outcome, delay)
        };

        trace!(?endpoint, ok = outcome.is_ok(), ?delay, "memory service call");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Confirmation, ClientError> {
        let body = self
            .call(Endpoint::Register, None, |svc, _| {
                if svc.users.contains_key(email) {
                    return Err(api(400, "User already exists"));
                }
                svc.users.insert(email.to_string(), password.to_string());
                Ok(json!({ "msg": "User registered successfully" }))
            })
            .await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenGrant, ClientError> {
        let outcome = self
            .call(Endpoint::Login, None, |svc, _| {
                if svc.users.get(email).map(String::as_str) != Some(password) {
                    return Err(api(400, "Invalid credentials"));
                }
                let token = uuid::Uuid::new_v4().simple().to_string();
                svc.tokens.insert(token.clone(), email.to_string());
                Ok(json!({ "access_token": token, "token_type": "bearer" }))
            })
            .await;
        match outcome {
            Ok(body) => wire::token_grant(body),
            Err(ClientError::Api { status, detail }) if (400..500).contains(&status) => {
                Err(ClientError::InvalidCredentials(detail))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_projects(&self, token: &str) -> Result<Vec<Project>, ClientError> {
        let body = self
            .call(Endpoint::ListProjects, Some(token), |svc, user| {
                let items: Vec<Value> = svc
                    .projects
                    .iter()
                    .filter(|(_, p)| p.owner == user)
                    .map(|(id, p)| Service::project_json(*id, p))
                    .collect();
                Ok(match svc.list_shape {
                    ListShape::Bare => Value::Array(items),
                    ListShape::Items => json!({ "items": items }),
                    ListShape::Projects => json!({ "projects": items }),
                })
            })
            .await?;
        wire::collection(body)
    }

    pub async fn create_project(&self, token: &str, project: &NewProject) -> Result<Project, ClientError> {
        let body = self
            .call(Endpoint::CreateProject, Some(token), |svc, user| {
                svc.last_id += 1;
                let id = svc.last_id;
                let stored = StoredProject {
                    owner: user.to_string(),
                    name: project.name.clone(),
                    description: project.description.clone(),
                    files: Vec::new(),
                    chat: Vec::new(),
                };
                let body = Service::project_json(id, &stored);
                svc.projects.insert(id, stored);
                debug!(project_id = id, "memory service created project");
                Ok(body)
            })
            .await?;
        wire::entity(body)
    }

    pub async fn delete_project(&self, token: &str, id: ProjectId) -> Result<Confirmation, ClientError> {
        let body = self
            .call(Endpoint::DeleteProject, Some(token), |svc, user| {
                svc.owned_mut(user, id)?;
                svc.projects.remove(&id.0);
                Ok(json!({ "msg": "Project deleted" }))
            })
            .await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn send_chat(&self, token: &str, id: ProjectId, message: &str) -> Result<ChatReply, ClientError> {
        let body = self
            .call(Endpoint::SendChat, Some(token), |svc, user| {
                let shape = svc.chat_shape;
                let project = svc.owned_mut(user, id)?;
                if message.is_empty() {
                    return Err(api(400, "Message cannot be empty"));
                }
                let reply = format!("Echo: {message}");
                project.chat.push(Message::user(message));
                project.chat.push(Message::assistant(reply.clone()));
                Ok(match shape {
                    ChatShape::History => json!({ "history": project.chat, "response": reply }),
                    ChatShape::ReplyOnly => json!({ "reply": reply }),
                })
            })
            .await?;
        wire::chat_reply(body)
    }

    pub async fn reset_chat(&self, token: &str, id: ProjectId) -> Result<Confirmation, ClientError> {
        let body = self
            .call(Endpoint::ResetChat, Some(token), |svc, user| {
                svc.owned_mut(user, id)?.chat.clear();
                Ok(json!({ "msg": "Chat history cleared" }))
            })
            .await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn upload_file(&self, token: &str, id: ProjectId, upload: &Upload) -> Result<Confirmation, ClientError> {
        let body = self
            .call(Endpoint::UploadFile, Some(token), |svc, user| {
                let project = svc.owned_mut(user, id)?;
                if upload.file_name.is_empty() {
                    return Err(api(400, "File name is required"));
                }
                if !project.files.contains(&upload.file_name) {
                    project.files.push(upload.file_name.clone());
                }
                Ok(json!({ "msg": "File uploaded", "filename": upload.file_name }))
            })
            .await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn delete_file(&self, token: &str, id: ProjectId, handle: &FileHandle) -> Result<Confirmation, ClientError> {
        let body = self
            .call(Endpoint::DeleteFile, Some(token), |svc, user| {
                let project = svc.owned_mut(user, id)?;
                let pos = project
                    .files
                    .iter()
                    .position(|f| f == handle.name())
                    .ok_or_else(|| api(404, "File not found"))?;
                let removed = project.files.remove(pos);
                Ok(json!({ "msg": format!("File '{removed}' deleted") }))
            })
            .await?;
        Ok(wire::confirmation(&body))
    }

    pub async fn ping(&self) -> Result<PingStatus, ClientError> {
        let body = self.call(Endpoint::Ping, None, |_, _| Ok(json!({ "msg": "pong" }))).await?;
        Ok(wire::ping(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn signed_in(gw: &MemoryGateway) -> String {
        gw.register("a@x.com", "pw").await.unwrap();
        gw.login("a@x.com", "pw").await.unwrap().access_token
    }

    #[tokio::test]
    async fn register_twice_is_rejected() {
        let gw = MemoryGateway::new();
        gw.register("a@x.com", "pw").await.unwrap();
        let err = gw.register("a@x.com", "pw").await.unwrap_err();
        assert_eq!(err, api(400, "User already exists"));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let gw = MemoryGateway::new();
        gw.register("a@x.com", "pw").await.unwrap();
        let err = gw.login("a@x.com", "nope").await.unwrap_err();
        assert_eq!(err, ClientError::InvalidCredentials("Invalid credentials".into()));
    }

    #[tokio::test]
    async fn projects_are_scoped_to_owner() {
        let gw = MemoryGateway::new();
        let a = signed_in(&gw).await;
        gw.register("b@x.com", "pw").await.unwrap();
        let b = gw.login("b@x.com", "pw").await.unwrap().access_token;

        gw.create_project(&a, &NewProject { name: "mine".into(), description: None }).await.unwrap();
        assert_eq!(gw.list_projects(&a).await.unwrap().len(), 1);
        assert!(gw.list_projects(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_list_shape_normalises() {
        for shape in [ListShape::Bare, ListShape::Items, ListShape::Projects] {
            let gw = MemoryGateway::new().with_list_shape(shape);
            let t = signed_in(&gw).await;
            gw.create_project(&t, &NewProject { name: "p".into(), description: None }).await.unwrap();
            let listed = gw.list_projects(&t).await.unwrap();
            assert_eq!(listed.len(), 1, "shape {shape:?}");
        }
    }

    #[tokio::test]
    async fn chat_shapes() {
        let gw = MemoryGateway::new();
        let t = signed_in(&gw).await;
        let p = gw.create_project(&t, &NewProject { name: "p".into(), description: None }).await.unwrap();

        let full = gw.send_chat(&t, p.id, "hi").await.unwrap();
        assert_eq!(
            full,
            ChatReply::History(vec![Message::user("hi"), Message::assistant("Echo: hi")])
        );

        gw.set_chat_shape(ChatShape::ReplyOnly);
        assert_eq!(gw.send_chat(&t, p.id, "again").await.unwrap(), ChatReply::Reply("Echo: again".into()));
        assert_eq!(gw.history_of(p.id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn expired_token_is_401() {
        let gw = MemoryGateway::new();
        let t = signed_in(&gw).await;
        gw.expire_tokens();
        let err = gw.list_projects(&t).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn injected_failure_leaves_state_untouched() {
        let gw = MemoryGateway::new();
        let t = signed_in(&gw).await;
        gw.fail_next(Endpoint::CreateProject, ClientError::Transport("connection reset".into()));
        let err = gw
            .create_project(&t, &NewProject { name: "p".into(), description: None })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Transport("connection reset".into()));
        assert!(gw.list_projects(&t).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn files_are_addressed_by_name() {
        let gw = MemoryGateway::new();
        let t = signed_in(&gw).await;
        let p = gw.create_project(&t, &NewProject { name: "p".into(), description: None }).await.unwrap();
        gw.upload_file(&t, p.id, &Upload::new("a.pdf", b"a".to_vec())).await.unwrap();
        gw.upload_file(&t, p.id, &Upload::new("b.pdf", b"b".to_vec())).await.unwrap();

        gw.delete_file(&t, p.id, &FileHandle::named("a.pdf")).await.unwrap();
        assert_eq!(gw.files_of(p.id).unwrap(), vec!["b.pdf".to_string()]);

        let err = gw.delete_file(&t, p.id, &FileHandle::named("a.pdf")).await.unwrap_err();
        assert_eq!(err, api(404, "File not found"));
    }
}
