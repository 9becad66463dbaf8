//! [`Workspace`]: the top-level controller a view layer drives.
//!
//! Owns the gateway, the auth session and the three stores. Each operation
//! takes a snapshot of the current [`Session`] and passes it explicitly down.
//! An authenticated call answered with 401 forces a logout: the token and
//! every cached project, selection and transcript are dropped, and the view
//! is expected to prompt for a new login. Each login or logout moves the
//! stores to the new identity epoch, so operations still running for the
//! previous identity cannot write into the new one's cache.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::config::Config;
use crate::error::{AppError, ClientError};
use crate::gateway::ApiGateway;
use crate::models::{Confirmation, FileHandle, FileRef, Message, PingStatus, Project, ProjectId, Upload};
use crate::session::{AuthSession, Session, TokenFile};
use crate::store::ProjectStore;
use crate::files::FileAttachmentManager;
use crate::chat::ChatSession;

pub struct Workspace {
    gateway: ApiGateway,
    auth: AuthSession,
    store: Arc<ProjectStore>,
    files: FileAttachmentManager,
    chat: ChatSession,
}

impl Workspace {
    pub fn new(gateway: ApiGateway, token_file: Option<TokenFile>) -> Self {
        let store = Arc::new(ProjectStore::new(gateway.clone()));
        Self {
            auth: AuthSession::new(gateway.clone(), token_file),
            files: FileAttachmentManager::new(store.clone()),
            chat: ChatSession::new(store.clone()),
            store,
            gateway,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let gateway = ApiGateway::from_base_url(&config.api.base_url)
            .map_err(|e| AppError::Config(format!("api.base_url: {e}")))?;
        let token_file = config.session.persist.then(|| TokenFile::new(config.session.token_file.clone()));
        Ok(Self::new(gateway, token_file))
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn files(&self) -> &FileAttachmentManager {
        &self.files
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn session(&self) -> Session {
        self.auth.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// A 401 on an authenticated call ends the session it was made with;
    /// a later identity is left alone.
    fn guard<T>(&self, session: &Session, outcome: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &outcome {
            if e.is_unauthorized() && session.epoch() == self.session().epoch() {
                warn!(error = %e, "authorization rejected; forcing re-login");
                self.logout();
            }
        }
        outcome
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Confirmation, ClientError> {
        self.auth.register(email, password).await
    }

    /// Log in. Data cached under a previous identity is dropped first.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        let token = self.auth.login(email, password).await?;
        self.adopt_identity();
        Ok(token)
    }

    pub fn logout(&self) {
        self.auth.logout();
        self.adopt_identity();
    }

    /// Empty the caches and bind them to the current session's epoch.
    fn adopt_identity(&self) {
        let epoch = self.auth.session().epoch();
        self.store.clear(epoch);
        self.chat.clear(epoch);
    }

    pub async fn refresh_projects(&self) -> Result<Vec<Project>, ClientError> {
        let session = self.session();
        let projects = self.guard(&session, self.store.refresh(&session).await)?;
        self.sync_transcripts();
        Ok(projects)
    }

    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project, ClientError> {
        let session = self.session();
        self.guard(&session, self.store.create(&session, name, description).await)
    }

    pub async fn delete_project(&self, id: ProjectId) -> Result<Vec<Project>, ClientError> {
        let session = self.session();
        let outcome = self.guard(&session, self.store.remove(&session, id).await);
        // A confirmed delete drops the project from the cache even if the
        // re-list failed; its transcript goes with it.
        if session.epoch() == self.session().epoch() && !self.store.contains(id) {
            self.chat.discard(id);
        }
        self.sync_transcripts();
        outcome
    }

    pub fn select_project(&self, id: ProjectId) -> Result<Project, ClientError> {
        self.store.select(id)
    }

    pub fn deselect_project(&self) {
        self.store.deselect();
    }

    pub fn selected_project(&self) -> Option<Project> {
        self.store.selected()
    }

    pub async fn upload_file(&self, id: ProjectId, upload: &Upload) -> Result<Vec<FileRef>, ClientError> {
        let session = self.session();
        self.guard(&session, self.files.upload(&session, id, upload).await)?;
        self.sync_transcripts();
        Ok(self.files.files(id).unwrap_or_default())
    }

    pub async fn delete_file(&self, id: ProjectId, handle: &FileHandle) -> Result<Vec<FileRef>, ClientError> {
        let session = self.session();
        self.guard(&session, self.files.remove(&session, id, handle).await)?;
        self.sync_transcripts();
        Ok(self.files.files(id).unwrap_or_default())
    }

    pub async fn send_message(&self, id: ProjectId, content: &str) -> Result<Vec<Message>, ClientError> {
        let session = self.session();
        self.guard(&session, self.chat.send(&session, id, content).await)
    }

    pub async fn reset_chat(&self, id: ProjectId) -> Result<(), ClientError> {
        let session = self.session();
        self.guard(&session, self.chat.reset(&session, id).await)
    }

    pub fn active_transcript(&self) -> Vec<Message> {
        self.chat.active_transcript()
    }

    pub async fn ping(&self) -> Result<PingStatus, ClientError> {
        self.gateway.ping().await
    }

    /// Drop transcripts of projects the cache no longer lists.
    fn sync_transcripts(&self) {
        let live: HashSet<ProjectId> = self.store.projects().iter().map(|p| p.id).collect();
        self.chat.retain(&live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, SessionConfig};

    fn config(base_url: &str) -> Config {
        Config {
            log_level: "info".into(),
            api: ApiConfig { base_url: base_url.into() },
            session: SessionConfig { persist: false, token_file: "unused".into() },
        }
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        match Workspace::from_config(&config("not a url")) {
            Err(AppError::Config(msg)) => assert!(msg.contains("api.base_url")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("invalid base url accepted"),
        }
    }

    #[test]
    fn memory_url_builds_anonymous_workspace() {
        let ws = Workspace::from_config(&config(crate::gateway::MEMORY_URL)).unwrap();
        assert!(!ws.is_authenticated());
        assert!(ws.store().projects().is_empty());
    }
}
