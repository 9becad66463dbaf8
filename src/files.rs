//! Upload/remove protocol for a project's attachments.
//!
//! The service answers both calls with a bare confirmation, never the new
//! file list, so each settled call is followed by a store refresh: the list a
//! caller sees afterwards is the server's, not a locally patched guess.
//! Calls on the same project queue on that project's lane.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ClientError;
use crate::models::{FileHandle, FileRef, ProjectId, Upload};
use crate::session::Session;
use crate::store::ProjectStore;

pub struct FileAttachmentManager {
    store: Arc<ProjectStore>,
}

impl FileAttachmentManager {
    pub fn new(store: Arc<ProjectStore>) -> Self {
        Self { store }
    }

    /// Files of `id` as last listed by the service.
    pub fn files(&self, id: ProjectId) -> Option<Vec<FileRef>> {
        self.store.files(id)
    }

    pub async fn upload(&self, session: &Session, id: ProjectId, upload: &Upload) -> Result<(), ClientError> {
        if upload.file_name.trim().is_empty() {
            return Err(ClientError::Validation { field: "file" });
        }
        let _lane = self.store.enter_lane(id).await;
        debug!(project_id = %id, file = %upload.file_name, bytes = upload.bytes.len(), "uploading file");
        let outcome = self.store.gateway().upload_file(session, id, upload).await;
        self.settle(session, id, outcome.map(|_| ()), "uploaded").await
    }

    pub async fn remove(&self, session: &Session, id: ProjectId, handle: &FileHandle) -> Result<(), ClientError> {
        let _lane = self.store.enter_lane(id).await;
        debug!(project_id = %id, file = %handle, "removing file");
        let outcome = self.store.gateway().delete_file(session, id, handle).await;
        self.settle(session, id, outcome.map(|_| ()), "removed").await
    }

    /// Re-list after the mutation: on success, and on a server-side failure
    /// (the service saw the request, so its list is the truth to show). A
    /// transport failure surfaces as is.
    async fn settle(
        &self,
        session: &Session,
        id: ProjectId,
        outcome: Result<(), ClientError>,
        verb: &'static str,
    ) -> Result<(), ClientError> {
        match outcome {
            Ok(()) => {
                self.store.refresh(session).await?;
                info!(project_id = %id, "file {verb}");
                Ok(())
            }
            Err(e) if e.is_server_reply() && !e.is_unauthorized() => {
                // The original failure is what the caller needs to see.
                let _ = self.store.refresh(session).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{Endpoint, MemoryGateway};
    use crate::gateway::ApiGateway;

    async fn setup() -> (MemoryGateway, Arc<ProjectStore>, FileAttachmentManager, Session, ProjectId) {
        let mem = MemoryGateway::new();
        let gw = ApiGateway::from(mem.clone());
        gw.register("a@x.com", "pw").await.unwrap();
        let s = Session::with_token(gw.login("a@x.com", "pw").await.unwrap().access_token);
        let store = Arc::new(ProjectStore::new(gw));
        let p = store.create(&s, "p", None).await.unwrap();
        store.select(p.id).unwrap();
        let files = FileAttachmentManager::new(store.clone());
        (mem, store, files, s, p.id)
    }

    fn names(files: Option<Vec<FileRef>>) -> Vec<String> {
        files.unwrap_or_default().into_iter().map(|f| f.name).collect()
    }

    #[tokio::test]
    async fn upload_refreshes_file_list() {
        let (mem, store, files, s, id) = setup().await;
        files.upload(&s, id, &Upload::new("a.pdf", b"%PDF".to_vec())).await.unwrap();
        assert_eq!(names(files.files(id)), vec!["a.pdf"]);
        assert_eq!(mem.call_count(Endpoint::ListProjects), 1);
        assert_eq!(store.selected().map(|p| p.files.len()), Some(1));
    }

    #[tokio::test]
    async fn remove_by_handle_survives_shifted_positions() {
        let (_mem, _store, files, s, id) = setup().await;
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            files.upload(&s, id, &Upload::new(name, vec![1])).await.unwrap();
        }
        let c = FileRef::new("c.pdf").handle();
        files.remove(&s, id, &FileHandle::named("a.pdf")).await.unwrap();
        files.remove(&s, id, &c).await.unwrap();
        assert_eq!(names(files.files(id)), vec!["b.pdf"]);
    }

    #[tokio::test]
    async fn server_rejection_still_refreshes() {
        let (mem, _store, files, s, id) = setup().await;
        let err = files.remove(&s, id, &FileHandle::named("missing.pdf")).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
        assert_eq!(mem.call_count(Endpoint::ListProjects), 1);
    }

    #[tokio::test]
    async fn transport_failure_does_not_refresh() {
        let (mem, _store, files, s, id) = setup().await;
        mem.fail_next(Endpoint::UploadFile, ClientError::Transport("reset".into()));
        let err = files.upload(&s, id, &Upload::new("a.pdf", vec![1])).await.unwrap_err();
        assert_eq!(err, ClientError::Transport("reset".into()));
        assert_eq!(mem.call_count(Endpoint::ListProjects), 0);
    }

    #[tokio::test]
    async fn nameless_upload_is_refused_locally() {
        let (mem, _store, files, s, id) = setup().await;
        let err = files.upload(&s, id, &Upload::new("", vec![1])).await.unwrap_err();
        assert_eq!(err, ClientError::Validation { field: "file" });
        assert_eq!(mem.call_count(Endpoint::UploadFile), 0);
    }
}
