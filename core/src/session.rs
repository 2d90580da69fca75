use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

use crate::api::client::ApiClient;
use crate::api::types::{
    AuthResponse, LoginRequest, RefreshTokenResponse, RegisterRequest, StatusResponse, UserProfile,
};
use crate::errors::{WalletError, WalletResult};
use crate::storage::{SessionData, SessionStore};
use crate::validation::InputValidator;

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    user: Option<UserProfile>,
}

/// Read-side handle to the session's auth state, shared with the API
/// client.
///
/// The session manager is the only writer; the client may additionally
/// clear the state when the backend rejects the token.
#[derive(Clone, Default)]
pub struct AuthHandle {
    state: Arc<RwLock<AuthState>>,
}

impl AuthHandle {
    /// Current bearer token, if any.
    pub fn bearer(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    /// Authenticated state is the conjunction of token and profile.
    pub fn is_authenticated(&self) -> bool {
        let state = self.state.read();
        state.token.is_some() && state.user.is_some()
    }

    pub(crate) fn invalidate(&self) {
        let mut state = self.state.write();
        state.token = None;
        state.user = None;
    }
}

/// Manages login state: the bearer token, the user profile, and their
/// persisted copies.
#[derive(Clone)]
pub struct SessionManager {
    auth: AuthHandle,
    client: Arc<ApiClient>,
    store: SessionStore,
}

impl SessionManager {
    pub fn new(auth: AuthHandle, client: Arc<ApiClient>, store: SessionStore) -> Self {
        Self { auth, client, store }
    }

    /// Restore a previously persisted session, if any.
    ///
    /// A corrupted or unreadable session file is treated as logged out and
    /// cleared rather than surfaced to the caller.
    pub fn initialize(&self) {
        match self.store.load() {
            Ok(Some(data)) => {
                let mut state = self.auth.state.write();
                state.token = Some(data.token.clone());
                state.user = Some(data.user.clone());
            }
            Ok(None) => {}
            Err(error) => {
                log::warn!("Discarding unreadable session data: {}", error);
                if let Err(error) = self.store.clear() {
                    log::warn!("Failed to clear session data: {}", error);
                }
            }
        }
    }

    /// Submit credentials and establish an authenticated session.
    pub async fn login(&self, email: &str, password: &SecretString) -> WalletResult<UserProfile> {
        InputValidator::shared().validate_email(email)?;

        let request = LoginRequest {
            email: email.to_string(),
            password: password.expose_secret().to_string(),
        };
        let response: AuthResponse = self
            .client
            .post("/api/auth/login", &request)
            .await
            .map_err(map_login_error)?;

        Ok(self.install(response, email))
    }

    /// Create a new account and establish an authenticated session.
    pub async fn register(&self, email: &str, password: &SecretString) -> WalletResult<UserProfile> {
        InputValidator::shared().validate_email(email)?;

        let request = RegisterRequest {
            email: email.to_string(),
            password: password.expose_secret().to_string(),
        };
        let response: AuthResponse = self
            .client
            .post("/api/auth/register", &request)
            .await
            .map_err(map_register_error)?;

        Ok(self.install(response, email))
    }

    /// Log out of this device.
    ///
    /// The server-side invalidation is best-effort; local state is cleared
    /// unconditionally, even when the backend is unreachable.
    pub async fn logout(&self) {
        if let Err(error) = self
            .client
            .post_empty::<StatusResponse>("/api/auth/logout")
            .await
        {
            log::warn!(
                "Logout request failed, clearing local session anyway: {}",
                error
            );
        }

        self.auth.invalidate();
        if let Err(error) = self.store.clear() {
            log::warn!("Failed to clear persisted session: {}", error);
        }
    }

    /// Exchange the current token for a fresh one.
    pub async fn refresh_token(&self) -> WalletResult<()> {
        let user = self
            .auth
            .state
            .read()
            .user
            .clone()
            .ok_or(WalletError::NotInitialized)?;

        let response: RefreshTokenResponse =
            self.client.post_empty("/api/auth/refresh").await?;

        self.auth.state.write().token = Some(response.token.clone());
        self.persist(response.token, user);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.auth.state.read().user.clone()
    }

    pub fn auth_handle(&self) -> AuthHandle {
        self.auth.clone()
    }

    fn install(&self, response: AuthResponse, email: &str) -> UserProfile {
        let user = response.user.unwrap_or_else(|| UserProfile {
            id: None,
            email: email.to_string(),
            name: None,
            wallet_address: None,
        });

        {
            let mut state = self.auth.state.write();
            state.token = Some(response.token.clone());
            state.user = Some(user.clone());
        }

        self.persist(response.token, user.clone());
        user
    }

    fn persist(&self, token: String, user: UserProfile) {
        // The in-memory session is live either way; a persistence failure
        // only costs the restore on next launch.
        if let Err(error) = self.store.save(&SessionData::new(token, user)) {
            log::warn!("Failed to persist session: {}", error);
        }
    }
}

fn map_login_error(error: WalletError) -> WalletError {
    match error {
        WalletError::Unauthorized(_) => {
            WalletError::Unauthorized("Incorrect email or password".to_string())
        }
        WalletError::ApiError { status: 404, .. } => {
            WalletError::NotFound("No account registered for this email".to_string())
        }
        other => other,
    }
}

fn map_register_error(error: WalletError) -> WalletError {
    match error {
        WalletError::ApiError { status: 409, .. } => {
            WalletError::AlreadyExists("An account with this email already exists".to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> SessionManager {
        let paths = StoragePaths::new(temp.path()).unwrap();
        paths.ensure_directories().unwrap();
        let auth = AuthHandle::default();
        let client = Arc::new(
            ApiClient::new("http://127.0.0.1:1", Duration::from_millis(200), auth.clone())
                .unwrap(),
        );
        SessionManager::new(auth, client, SessionStore::from_paths(&paths))
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: Some("user-1".to_string()),
            email: "user@example.com".to_string(),
            name: Some("Test User".to_string()),
            wallet_address: Some("rExampleAddress".to_string()),
        }
    }

    #[test]
    fn initialize_without_stored_session_is_logged_out() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager.initialize();
        assert!(!manager.is_authenticated());
        assert_eq!(manager.current_user(), None);
    }

    #[test]
    fn initialize_restores_persisted_session() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager
            .store
            .save(&SessionData::new("token-1".to_string(), profile()))
            .unwrap();

        manager.initialize();
        assert!(manager.is_authenticated());
        assert_eq!(manager.current_user(), Some(profile()));
        assert_eq!(manager.auth_handle().bearer(), Some("token-1".to_string()));
    }

    #[test]
    fn corrupted_session_data_is_cleared() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let paths = StoragePaths::new(temp.path()).unwrap();
        fs::write(paths.session_file(), b"not a session file").unwrap();

        manager.initialize();
        assert!(!manager.is_authenticated());
        assert!(!paths.session_file().exists());
    }

    #[tokio::test]
    async fn login_failure_leaves_logged_out() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let password = SecretString::from("hunter2!".to_string());

        let error = manager
            .login("user@example.com", &password)
            .await
            .expect_err("backend is unreachable");
        assert!(matches!(
            error,
            WalletError::NetworkError(_) | WalletError::ConnectionTimeout
        ));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn invalid_email_is_rejected_before_any_network_call() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let password = SecretString::from("hunter2!".to_string());

        let error = manager
            .login("not-an-email", &password)
            .await
            .expect_err("email must be rejected");
        assert!(matches!(error, WalletError::ValidationError(_)));
    }

    #[test]
    fn login_errors_distinguish_credentials_from_unknown_account() {
        let unauthorized = map_login_error(WalletError::Unauthorized("raw".to_string()));
        assert!(
            matches!(unauthorized, WalletError::Unauthorized(msg) if msg.contains("password"))
        );

        let unknown = map_login_error(WalletError::ApiError {
            status: 404,
            message: "raw".to_string(),
        });
        assert!(matches!(unknown, WalletError::NotFound(msg) if msg.contains("email")));

        let passthrough = map_login_error(WalletError::ConnectionTimeout);
        assert!(matches!(passthrough, WalletError::ConnectionTimeout));
    }

    #[test]
    fn register_conflict_maps_to_already_exists() {
        let conflict = map_register_error(WalletError::ApiError {
            status: 409,
            message: "raw".to_string(),
        });
        assert!(matches!(conflict, WalletError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn logout_clears_locally_when_server_unreachable() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager
            .store
            .save(&SessionData::new("token-1".to_string(), profile()))
            .unwrap();
        manager.initialize();
        assert!(manager.is_authenticated());

        manager.logout().await;
        assert!(!manager.is_authenticated());
        assert_eq!(manager.store.load().unwrap(), None);
    }
}
