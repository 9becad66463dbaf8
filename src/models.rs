//! Domain values shared by the gateway and the in-memory stores.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-assigned project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ProjectId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl Project {
    pub fn file(&self, name: &str) -> Option<&FileRef> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// One attachment as listed by the service.
///
/// Decodes from either a bare filename string or an object with a
/// `filename` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFileRef")]
pub struct FileRef {
    #[serde(rename = "filename")]
    pub name: String,
}

impl FileRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Handle that addresses this attachment for deletion.
    pub fn handle(&self) -> FileHandle {
        FileHandle(self.name.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFileRef {
    Name(String),
    Object { filename: String },
}

impl From<RawFileRef> for FileRef {
    fn from(raw: RawFileRef) -> Self {
        match raw {
            RawFileRef::Name(name) | RawFileRef::Object { filename: name } => FileRef { name },
        }
    }
}

/// Opaque, name-based address of one attachment.
///
/// Positions shift when another attachment is removed; names do not, so
/// handles stay valid across refreshes. A backend that addresses files by
/// position resolves the name at request time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub(crate) fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "bot")]
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Body of the create-project call.
#[derive(Debug, Clone, Serialize)]
pub struct NewProject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A file to be sent as a multipart upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { file_name: file_name.into(), bytes: bytes.into(), mime: None }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a file from disk; the upload is named after the path's file name.
    pub async fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("pdf") => Some("application/pdf".to_string()),
            Some("txt") | Some("md") => Some("text/plain".to_string()),
            _ => None,
        };
        Ok(Self { file_name, bytes, mime })
    }
}

/// Acknowledgement returned by endpoints that do not echo state back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Confirmation {
    pub message: String,
}

/// Outcome of the unauthenticated reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    pub reachable: bool,
    pub message: String,
}
