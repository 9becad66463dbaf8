//! Request/response boundary to the project service.
//!
//! `ApiGateway` is an enum over concrete backends. Every method attaches the
//! bearer token for authenticated endpoints, encodes the body the endpoint
//! expects, and hands back normalised values: callers never branch on which
//! response shape the service used.
//!
//! Backends are stateless request builders (the memory backend's state *is*
//! the emulated service) and are cheap to clone.

pub mod http;
pub mod memory;
pub(crate) mod wire;

use crate::error::ClientError;
use crate::models::{
    Confirmation, FileHandle, Message, NewProject, PingStatus, Project, ProjectId, Upload,
};
use crate::session::Session;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

/// `base_url` value that selects the in-process backend.
pub const MEMORY_URL: &str = "memory://";

/// What the chat endpoint answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// The full, authoritative transcript for the project.
    History(Vec<Message>),
    /// Only the assistant's answer to the message just sent.
    Reply(String),
}

/// Token grant returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone)]
pub enum ApiGateway {
    Http(HttpGateway),
    Memory(MemoryGateway),
}

impl ApiGateway {
    /// Pick the backend from a configured base URL.
    pub fn from_base_url(base_url: &str) -> Result<Self, ClientError> {
        if base_url == MEMORY_URL {
            return Ok(ApiGateway::Memory(MemoryGateway::new()));
        }
        HttpGateway::new(base_url).map(ApiGateway::Http)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Confirmation, ClientError> {
        match self {
            ApiGateway::Http(g) => g.register(email, password).await,
            ApiGateway::Memory(g) => g.register(email, password).await,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenGrant, ClientError> {
        match self {
            ApiGateway::Http(g) => g.login(email, password).await,
            ApiGateway::Memory(g) => g.login(email, password).await,
        }
    }

    pub async fn list_projects(&self, session: &Session) -> Result<Vec<Project>, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.list_projects(token).await,
            ApiGateway::Memory(g) => g.list_projects(token).await,
        }
    }

    pub async fn create_project(
        &self,
        session: &Session,
        project: &NewProject,
    ) -> Result<Project, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.create_project(token, project).await,
            ApiGateway::Memory(g) => g.create_project(token, project).await,
        }
    }

    pub async fn delete_project(
        &self,
        session: &Session,
        id: ProjectId,
    ) -> Result<Confirmation, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.delete_project(token, id).await,
            ApiGateway::Memory(g) => g.delete_project(token, id).await,
        }
    }

    pub async fn send_chat(
        &self,
        session: &Session,
        id: ProjectId,
        message: &str,
    ) -> Result<ChatReply, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.send_chat(token, id, message).await,
            ApiGateway::Memory(g) => g.send_chat(token, id, message).await,
        }
    }

    pub async fn reset_chat(
        &self,
        session: &Session,
        id: ProjectId,
    ) -> Result<Confirmation, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.reset_chat(token, id).await,
            ApiGateway::Memory(g) => g.reset_chat(token, id).await,
        }
    }

    pub async fn upload_file(
        &self,
        session: &Session,
        id: ProjectId,
        upload: &Upload,
    ) -> Result<Confirmation, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.upload_file(token, id, upload).await,
            ApiGateway::Memory(g) => g.upload_file(token, id, upload).await,
        }
    }

    pub async fn delete_file(
        &self,
        session: &Session,
        id: ProjectId,
        handle: &FileHandle,
    ) -> Result<Confirmation, ClientError> {
        let token = session.bearer()?;
        match self {
            ApiGateway::Http(g) => g.delete_file(token, id, handle).await,
            ApiGateway::Memory(g) => g.delete_file(token, id, handle).await,
        }
    }

    pub async fn ping(&self) -> Result<PingStatus, ClientError> {
        match self {
            ApiGateway::Http(g) => g.ping().await,
            ApiGateway::Memory(g) => g.ping().await,
        }
    }
}

impl From<HttpGateway> for ApiGateway {
    fn from(g: HttpGateway) -> Self {
        ApiGateway::Http(g)
    }
}

impl From<MemoryGateway> for ApiGateway {
    fn from(g: MemoryGateway) -> Self {
        ApiGateway::Memory(g)
    }
}
