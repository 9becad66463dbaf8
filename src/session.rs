//! Authentication state.
//!
//! [`Session`] is the explicit credential value every core operation takes;
//! there is no ambient global token. [`AuthSession`] owns the current session
//! and moves it between authenticated and anonymous. A stored token is
//! trusted at startup without a server round-trip: the first authenticated
//! call that fails with 401 is what forces a new login.
//!
//! Every login and logout starts a new identity epoch. A `Session` snapshot
//! carries the epoch it was taken in, so the stores can tell a late response
//! of a previous identity from one of the current identity.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::gateway::ApiGateway;
use crate::models::Confirmation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    epoch: u64,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()), epoch: 0 }
    }

    /// Identity epoch this snapshot was taken in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Token for an authenticated endpoint; refuses locally when absent.
    pub(crate) fn bearer(&self) -> Result<&str, ClientError> {
        self.token().ok_or(ClientError::NotAuthenticated)
    }
}

/// On-disk home of the single persisted value: the bearer token.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    pub fn save(&self, token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

pub struct AuthSession {
    gateway: ApiGateway,
    session: RwLock<Session>,
    token_file: Option<TokenFile>,
}

impl AuthSession {
    /// Start from the persisted token, if any (optimistic authentication).
    pub fn new(gateway: ApiGateway, token_file: Option<TokenFile>) -> Self {
        let session = match token_file.as_ref().and_then(TokenFile::load) {
            Some(token) => {
                debug!("restored stored session token");
                Session::with_token(token)
            }
            None => Session::anonymous(),
        };
        Self { gateway, session: RwLock::new(session), token_file }
    }

    /// Snapshot of the current session, to pass to core operations.
    pub fn session(&self) -> Session {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    /// Replace the session, starting a new epoch.
    fn set(&self, session: Session) {
        let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
        let epoch = current.epoch + 1;
        *current = Session { epoch, ..session };
    }

    /// Exchange credentials for a bearer token and become authenticated.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        validate_credentials(email, password)?;
        let grant = self.gateway.login(email, password).await?;
        if !grant.token_type.eq_ignore_ascii_case("bearer") {
            warn!(token_type = %grant.token_type, "unexpected token type; sending it as a bearer token");
        }
        if let Some(file) = &self.token_file {
            if let Err(e) = file.save(&grant.access_token) {
                warn!(path = %file.path().display(), error = %e, "failed to persist session token");
            }
        }
        self.set(Session::with_token(grant.access_token.clone()));
        info!(email, "logged in");
        Ok(grant.access_token)
    }

    /// Create an account. Does not log in; the caller prompts for that.
    pub async fn register(&self, email: &str, password: &str) -> Result<Confirmation, ClientError> {
        validate_credentials(email, password)?;
        let confirmation = self.gateway.register(email, password).await?;
        info!(email, "account registered");
        Ok(confirmation)
    }

    /// Drop the token. Idempotent, never fails.
    pub fn logout(&self) {
        if let Some(file) = &self.token_file {
            if let Err(e) = file.clear() {
                warn!(path = %file.path().display(), error = %e, "failed to remove session token");
            }
        }
        if self.is_authenticated() {
            info!("logged out");
        }
        self.set(Session::anonymous());
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ClientError> {
    if email.trim().is_empty() {
        return Err(ClientError::Validation { field: "email" });
    }
    if password.is_empty() {
        return Err(ClientError::Validation { field: "password" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::{Endpoint, MemoryGateway};

    fn auth(mem: &MemoryGateway, file: Option<TokenFile>) -> AuthSession {
        AuthSession::new(ApiGateway::from(mem.clone()), file)
    }

    #[test]
    fn anonymous_session_has_no_bearer() {
        assert_eq!(Session::anonymous().bearer(), Err(ClientError::NotAuthenticated));
        assert_eq!(Session::with_token("T").bearer(), Ok("T"));
    }

    #[tokio::test]
    async fn login_stores_token() {
        let mem = MemoryGateway::new();
        let a = auth(&mem, None);
        a.register("a@x.com", "pw").await.unwrap();
        assert!(!a.is_authenticated(), "register must not log in");

        let token = a.login("a@x.com", "pw").await.unwrap();
        assert_eq!(a.session().token(), Some(token.as_str()));
        assert!(a.is_authenticated());
    }

    #[tokio::test]
    async fn bad_login_keeps_session_anonymous() {
        let mem = MemoryGateway::new();
        let a = auth(&mem, None);
        a.register("a@x.com", "pw").await.unwrap();
        let err = a.login("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidCredentials(_)));
        assert!(!a.is_authenticated());
    }

    #[tokio::test]
    async fn transport_failure_is_not_invalid_credentials() {
        let mem = MemoryGateway::new();
        mem.fail_next(Endpoint::Login, ClientError::Transport("connection refused".into()));
        let err = auth(&mem, None).login("a@x.com", "pw").await.unwrap_err();
        assert_eq!(err, ClientError::Transport("connection refused".into()));
    }

    #[tokio::test]
    async fn empty_email_makes_no_request() {
        let mem = MemoryGateway::new();
        let err = auth(&mem, None).login("  ", "pw").await.unwrap_err();
        assert_eq!(err, ClientError::Validation { field: "email" });
        assert!(mem.calls().is_empty());
    }

    #[tokio::test]
    async fn each_login_and_logout_starts_a_new_epoch() {
        let mem = MemoryGateway::new();
        let a = auth(&mem, None);
        a.register("a@x.com", "pw").await.unwrap();
        let start = a.session().epoch();

        a.login("a@x.com", "pw").await.unwrap();
        let signed_in = a.session().epoch();
        assert!(signed_in > start);

        a.logout();
        assert!(a.session().epoch() > signed_in);
        assert!(!a.is_authenticated());
    }

    #[test]
    fn logout_is_idempotent() {
        let a = auth(&MemoryGateway::new(), None);
        a.logout();
        a.logout();
        assert!(!a.is_authenticated());
    }

    #[tokio::test]
    async fn token_file_round_trip_through_login_and_logout() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("nested").join("session.token"));
        let mem = MemoryGateway::new();

        let a = auth(&mem, Some(file.clone()));
        a.register("a@x.com", "pw").await.unwrap();
        let token = a.login("a@x.com", "pw").await.unwrap();
        assert_eq!(file.load().as_deref(), Some(token.as_str()));

        // A fresh AuthSession trusts the stored token without calling the server.
        let calls_before = mem.calls().len();
        let restored = auth(&mem, Some(file.clone()));
        assert_eq!(restored.session().token(), Some(token.as_str()));
        assert_eq!(mem.calls().len(), calls_before);

        restored.logout();
        assert!(file.load().is_none());
    }

    #[test]
    fn blank_token_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.token");
        fs::write(&path, "  \n").unwrap();
        assert!(TokenFile::new(path).load().is_none());
    }
}
