//! [`ProjectStore`]: in-memory cache of the project collection and the
//! active selection.
//!
//! The cache is replaced wholesale by a listing, extended by a created entity
//! the service returned, and loses a project once the service confirmed its
//! deletion. Every collection operation draws a ticket from one sequence; a
//! listing whose ticket is older than the last applied one is discarded, so a
//! slow refresh cannot overwrite a newer one. Tickets also carry the identity
//! epoch of the session they were issued for: after [`ProjectStore::clear`]
//! nothing started under the previous identity is applied.
//! Operations that mutate one project (delete, file changes) also hold that
//! project's lane, which queues them FIFO.
//!
//! Readers get clones. After a refresh, previously returned values are
//! snapshots only; re-read from the store.

use std::collections::HashSet;
use std::sync::Mutex;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::models::{FileRef, NewProject, Project, ProjectId};
use crate::session::Session;
use crate::sync::{lock, Lanes, Sequencer, Ticket};

const COLLECTION: &str = "projects";

#[derive(Debug, Default)]
struct StoreState {
    projects: Vec<Project>,
    selected: Option<ProjectId>,
    seq: Sequencer<&'static str>,
}

impl StoreState {
    fn contains(&self, id: ProjectId) -> bool {
        self.projects.iter().any(|p| p.id == id)
    }

    /// Drop the selection if its project is no longer cached.
    fn reresolve_selection(&mut self) {
        if let Some(id) = self.selected {
            if !self.contains(id) {
                info!(project_id = %id, "selected project is gone; clearing selection");
                self.selected = None;
            }
        }
    }
}

pub struct ProjectStore {
    gateway: ApiGateway,
    state: Mutex<StoreState>,
    lanes: Lanes<ProjectId>,
}

impl ProjectStore {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway, state: Mutex::new(StoreState::default()), lanes: Lanes::new() }
    }

    pub(crate) fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn projects(&self) -> Vec<Project> {
        lock(&self.state).projects.clone()
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        lock(&self.state).projects.iter().find(|p| p.id == id).cloned()
    }

    pub fn contains(&self, id: ProjectId) -> bool {
        lock(&self.state).contains(id)
    }

    /// Current file list of a cached project.
    pub fn files(&self, id: ProjectId) -> Option<Vec<FileRef>> {
        self.project(id).map(|p| p.files)
    }

    pub fn selected_id(&self) -> Option<ProjectId> {
        lock(&self.state).selected
    }

    pub fn selected(&self) -> Option<Project> {
        let st = lock(&self.state);
        st.selected.and_then(|id| st.projects.iter().find(|p| p.id == id).cloned())
    }

    /// Fetch the full collection and replace the cache with it.
    ///
    /// Returns the cache as it stands afterwards, which is the previous
    /// contents when this listing turned out to be stale.
    pub async fn refresh(&self, session: &Session) -> Result<Vec<Project>, ClientError> {
        let ticket = lock(&self.state).seq.issue(&COLLECTION, session.epoch());
        debug!(seq = ticket.seq(), epoch = session.epoch(), "refreshing projects");
        let listing = self.gateway.list_projects(session).await?;
        Ok(self.apply_listing(&ticket, listing))
    }

    fn apply_listing(&self, ticket: &Ticket<&'static str>, listing: Vec<Project>) -> Vec<Project> {
        let mut st = lock(&self.state);
        if !st.seq.settle(ticket) {
            warn!(seq = ticket.seq(), "discarding stale project listing");
            return st.projects.clone();
        }
        st.projects = dedupe(listing);
        st.reresolve_selection();
        debug!(seq = ticket.seq(), count = st.projects.len(), "project cache replaced");
        st.projects.clone()
    }

    /// Create a project and append the returned entity. Empty names are
    /// refused before any request.
    pub async fn create(
        &self,
        session: &Session,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation { field: "name" });
        }
        let body = NewProject {
            name: name.to_string(),
            description: description.map(str::trim).filter(|d| !d.is_empty()).map(String::from),
        };

        let ticket = lock(&self.state).seq.issue(&COLLECTION, session.epoch());
        let created = self.gateway.create_project(session, &body).await?;

        let mut st = lock(&self.state);
        if !st.seq.is_current(&ticket) {
            warn!(project_id = %created.id, "identity changed while creating; not caching the project");
            return Ok(created);
        }
        // The entity exists server-side whatever else settled meanwhile;
        // settling still retires listings issued before this call.
        st.seq.settle(&ticket);
        match st.projects.iter_mut().find(|p| p.id == created.id) {
            Some(existing) => *existing = created.clone(),
            None => st.projects.push(created.clone()),
        }
        info!(project_id = %created.id, name = %created.name, "project created");
        Ok(created)
    }

    /// Delete a project, then re-list (the delete endpoint does not return
    /// the new collection).
    ///
    /// Once the service confirms the delete the project leaves the cache and
    /// the selection, even when the follow-up listing fails.
    pub async fn remove(&self, session: &Session, id: ProjectId) -> Result<Vec<Project>, ClientError> {
        let _lane = self.lanes.enter(&id).await;
        self.gateway.delete_project(session, id).await?;
        {
            let mut st = lock(&self.state);
            if st.seq.epoch() == session.epoch() {
                st.projects.retain(|p| p.id != id);
                if st.selected == Some(id) {
                    st.selected = None;
                }
                // Listings issued before the delete may still list it.
                st.seq.supersede(&COLLECTION);
            }
        }
        info!(project_id = %id, "project deleted");
        self.refresh(session).await
    }

    pub fn select(&self, id: ProjectId) -> Result<Project, ClientError> {
        let mut st = lock(&self.state);
        let project = st
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(ClientError::UnknownProject(id))?;
        if st.selected != Some(id) {
            debug!(project_id = %id, "project selected");
        }
        st.selected = Some(id);
        Ok(project)
    }

    pub fn deselect(&self) {
        lock(&self.state).selected = None;
    }

    /// Forget everything and adopt the identity `epoch`, e.g. on logout.
    /// Operations of earlier epochs can no longer touch the cache.
    pub(crate) fn clear(&self, epoch: u64) {
        let mut st = lock(&self.state);
        st.projects.clear();
        st.selected = None;
        st.seq.begin_epoch(epoch);
    }

    /// Queue behind other mutations of `id`.
    pub(crate) async fn enter_lane(&self, id: ProjectId) -> OwnedMutexGuard<()> {
        self.lanes.enter(&id).await
    }
}

fn dedupe(listing: Vec<Project>) -> Vec<Project> {
    let mut seen = HashSet::new();
    listing
        .into_iter()
        .filter(|p| {
            let first = seen.insert(p.id);
            if !first {
                warn!(project_id = %p.id, "duplicate project id in listing; keeping the first");
            }
            first
        })
        .collect()
}
