//! Project chat client. Keeps an in-memory view of a user's projects, their
//! file attachments and per-project chat transcripts consistent with a remote
//! service across overlapping asynchronous operations.
//!
//! Layers, leaves first:
//! - [`session`]: the explicit [`Session`] credential and [`AuthSession`].
//! - [`gateway`]: the stateless request boundary ([`ApiGateway`]).
//! - [`store`]: the project cache and selection ([`ProjectStore`]).
//! - [`files`]: attachment upload/remove ([`FileAttachmentManager`]).
//! - [`chat`]: per-project transcripts ([`ChatSession`]).
//! - [`controller`]: [`Workspace`], which a view layer drives.

pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod files;
pub mod gateway;
pub mod logger;
pub mod models;
pub mod session;
pub mod store;
mod sync;

pub use chat::ChatSession;
pub use controller::Workspace;
pub use error::{AppError, ClientError};
pub use files::FileAttachmentManager;
pub use gateway::{ApiGateway, ChatReply};
pub use models::{FileHandle, FileRef, Message, Project, ProjectId, Role, Upload};
pub use session::{AuthSession, Session, TokenFile};
pub use store::ProjectStore;
