//! Authentication provider abstraction.
//!
//! The provisioning workflow needs four things from the auth collaborator:
//! register by email/password, sign in by email/password, fetch the current
//! principal, and patch the principal's metadata (the secondary copy of the
//! tenant/branch linkage). `RestAuth` talks to a GoTrue-style HTTP service;
//! `MemoryAuth` is the in-process double tests run against.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// The authenticated principal as the provider reports it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// Provider-side user metadata (full name, tenant/branch linkage copy).
    pub metadata: Value,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email is already registered")]
    AlreadyRegistered,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("no authenticated principal")]
    NotAuthenticated,

    #[error("auth API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new principal and start a session for it.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser, AuthError>;

    /// Authenticate an existing principal.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// The principal of the current session, if any.
    async fn current_user(&self) -> Result<Option<AuthUser>, AuthError>;

    /// Merge fields into the current principal's metadata.
    async fn update_user_metadata(&self, metadata: Value) -> Result<(), AuthError>;
}

// ============================================================================
// REST client
// ============================================================================

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user: AuthUser,
}

pub struct RestAuth {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    session: RwLock<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    email: String,
    #[serde(default)]
    user_metadata: Value,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    access_token: String,
    user: WireUser,
}

impl From<WireUser> for AuthUser {
    fn from(user: WireUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            metadata: user.user_metadata,
        }
    }
}

impl RestAuth {
    pub fn new(base_url: Url, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            session: RwLock::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url.join(path).map_err(|e| AuthError::Api {
            status: 0,
            message: format!("invalid auth URL {path}: {e}"),
        })
    }

    fn store_session(&self, session: WireSession) -> AuthUser {
        let user: AuthUser = session.user.into();
        *self.session.write() = Some(Session {
            access_token: session.access_token,
            user: user.clone(),
        });
        user
    }

    async fn session_request(
        &self,
        url: Url,
        body: &Value,
    ) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_auth_error(status.as_u16(), &text));
        }
        let session: WireSession = response.json().await?;
        Ok(self.store_session(session))
    }
}

/// Classify an auth error body by text, the only signal the provider gives.
fn map_auth_error(status: u16, body: &str) -> AuthError {
    let lowered = body.to_lowercase();
    if lowered.contains("already registered") || lowered.contains("user_already_exists") {
        return AuthError::AlreadyRegistered;
    }
    if lowered.contains("invalid login credentials") || lowered.contains("invalid_grant") {
        return AuthError::InvalidCredentials;
    }
    AuthError::Api {
        status,
        message: body.to_string(),
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser, AuthError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        self.session_request(self.endpoint("auth/v1/signup")?, &body)
            .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        self.session_request(url, &body).await
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, AuthError> {
        Ok(self.session.read().as_ref().map(|s| s.user.clone()))
    }

    async fn update_user_metadata(&self, metadata: Value) -> Result<(), AuthError> {
        let token = self
            .session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)?;
        let response = self
            .client
            .put(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .json(&serde_json::json!({ "data": metadata }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_auth_error(status.as_u16(), &text));
        }
        let user: WireUser = response.json().await?;
        if let Some(session) = self.session.write().as_mut() {
            session.user = user.into();
        }
        Ok(())
    }
}

// ============================================================================
// In-memory double
// ============================================================================

#[derive(Default)]
pub struct MemoryAuth {
    users: RwLock<Vec<(String, String, AuthUser)>>,
    current: RwLock<Option<AuthUser>>,
    fail_metadata_update: RwLock<bool>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user without signing in (simulates a previous partial run
    /// that created the principal).
    pub fn with_registered(self, email: &str, password: &str) -> Self {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            metadata: Value::Null,
        };
        self.users
            .write()
            .push((email.to_string(), password.to_string(), user));
        self
    }

    pub fn set_current(&self, user: AuthUser) {
        *self.current.write() = Some(user);
    }

    pub fn fail_metadata_updates(&self) {
        *self.fail_metadata_update.write() = true;
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<AuthUser, AuthError> {
        if self.users.read().iter().any(|(e, _, _)| e == email) {
            return Err(AuthError::AlreadyRegistered);
        }
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            metadata: serde_json::json!({ "full_name": full_name }),
        };
        self.users
            .write()
            .push((email.to_string(), password.to_string(), user.clone()));
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self
            .users
            .read()
            .iter()
            .find(|(e, p, _)| e == email && p == password)
            .map(|(_, _, u)| u.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        *self.current.write() = Some(user.clone());
        Ok(user)
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, AuthError> {
        Ok(self.current.read().clone())
    }

    async fn update_user_metadata(&self, metadata: Value) -> Result<(), AuthError> {
        if *self.fail_metadata_update.read() {
            return Err(AuthError::Api {
                status: 500,
                message: "injected metadata failure".to_string(),
            });
        }
        let mut current = self.current.write();
        let user = current.as_mut().ok_or(AuthError::NotAuthenticated)?;
        if let (Some(target), Some(source)) = (user.metadata.as_object_mut(), metadata.as_object())
        {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        } else {
            user.metadata = metadata;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_registered_detected_by_text() {
        let err = map_auth_error(422, r#"{"msg":"User already registered"}"#);
        assert!(matches!(err, AuthError::AlreadyRegistered));
        let err = map_auth_error(422, r#"{"error_code":"user_already_exists"}"#);
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[test]
    fn test_invalid_credentials_detected_by_text() {
        let err = map_auth_error(400, r#"{"msg":"Invalid login credentials"}"#);
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_memory_auth_signup_then_conflict() {
        let auth = MemoryAuth::new();
        auth.sign_up("a@b.c", "secret123", "A").await.unwrap();
        let err = auth.sign_up("a@b.c", "other", "A").await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_memory_auth_signin_sets_current() {
        let auth = MemoryAuth::new().with_registered("a@b.c", "secret123");
        assert!(auth.current_user().await.unwrap().is_none());
        auth.sign_in("a@b.c", "secret123").await.unwrap();
        assert!(auth.current_user().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_auth_metadata_merge() {
        let auth = MemoryAuth::new();
        auth.sign_up("a@b.c", "secret123", "A").await.unwrap();
        auth.update_user_metadata(serde_json::json!({"tenant_id": "t1"}))
            .await
            .unwrap();
        let user = auth.current_user().await.unwrap().unwrap();
        assert_eq!(user.metadata["full_name"], "A");
        assert_eq!(user.metadata["tenant_id"], "t1");
    }
}
