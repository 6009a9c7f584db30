//! Resource-owner authentication seam
//!
//! User and account management is a separate concern; the password grant and
//! the login dialog only need a way to turn credentials into a subject id
//! and the subject's scope. Deployments plug their own implementation; the
//! memory one backs tests and development.

use async_trait::async_trait;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// A successfully authenticated resource owner.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Space-separated scope tokens, or `*`.
    pub scope: String,
}

#[async_trait]
pub trait UserAuthenticator: Send + Sync {
    /// Verify a username/password pair. `None` means the credentials do not
    /// match; the caller maps that to the protocol error of its flow.
    async fn authenticate(&self, username: &str, password: &str) -> Option<AuthenticatedUser>;
}

struct UserRecord {
    user_id: String,
    password: String,
    scope: String,
}

/// In-memory authenticator for tests and development.
#[derive(Default)]
pub struct MemoryUsers {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str, password: &str, user_id: &str, scope: &str) {
        let mut users = self.users.write().await;
        users.insert(
            username.to_string(),
            UserRecord {
                user_id: user_id.to_string(),
                password: password.to_string(),
                scope: scope.to_string(),
            },
        );
    }
}

#[async_trait]
impl UserAuthenticator for MemoryUsers {
    async fn authenticate(&self, username: &str, password: &str) -> Option<AuthenticatedUser> {
        let users = self.users.read().await;
        let record = users.get(username)?;
        if bool::from(record.password.as_bytes().ct_eq(password.as_bytes())) {
            Some(AuthenticatedUser {
                user_id: record.user_id.clone(),
                scope: record.scope.clone(),
            })
        } else {
            None
        }
    }
}
