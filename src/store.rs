//! Entity store
//!
//! Owns the four persisted collections (`oauth_clients`, `oauth_auth_codes`,
//! `oauth_access_tokens`, `oauth_refresh_tokens`) behind an async trait so
//! the memory implementation can be swapped for a database. The store, not
//! its callers, runs client normalization and enforces uniqueness: reads
//! elsewhere rely on the derived fields being consistent.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::OAuthConfig;
use crate::models::{
    normalize, AccessToken, AuthorizationCode, Client, ClientDraft, ClientValidationError,
    RefreshToken,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ClientValidationError),

    #[error("client id already registered: {0}")]
    DuplicateClientId(String),

    #[error("client name already registered: {0}")]
    DuplicateName(String),

    #[error("client domain already registered: {0}")]
    DuplicateDomain(String),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("authorization code not found")]
    CodeNotFound,

    #[error("access token not found: {0}")]
    AccessTokenNotFound(Uuid),

    #[error("refresh token not found: {0}")]
    RefreshTokenNotFound(Uuid),
}

/// Query and mutation primitives over the persisted collections. Writes are
/// durable before the call returns; reads and writes are linearizable per
/// record.
#[async_trait]
pub trait OAuthStore: Send + Sync {
    /// Normalize and persist a client draft. Enforces `client_id`, `name`
    /// and `domaine` uniqueness.
    async fn create_client(&self, draft: ClientDraft) -> Result<Client, StoreError>;

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    /// Mark a client revoked; blocks all flows from then on.
    async fn revoke_client(&self, client_id: &str) -> Result<(), StoreError>;

    async fn create_authorization_code(
        &self,
        code: AuthorizationCode,
    ) -> Result<AuthorizationCode, StoreError>;

    async fn get_authorization_code(
        &self,
        id: Uuid,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Look up a pending code by the (client, opaque value) pair presented
    /// at the token endpoint.
    async fn find_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Record the resource owner's decision: attach the subject and the
    /// resolved scope to a pending code.
    async fn attach_authorization(
        &self,
        id: Uuid,
        user_id: &str,
        scope: &str,
    ) -> Result<AuthorizationCode, StoreError>;

    /// Conditional redemption: revoke the code iff it is not yet revoked and
    /// return it only on that transition. Under concurrent redemptions at
    /// most one caller receives `Some`.
    async fn consume_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn create_access_token(&self, token: AccessToken) -> Result<AccessToken, StoreError>;

    async fn get_access_token(&self, id: Uuid) -> Result<Option<AccessToken>, StoreError>;

    /// Revoke an access token; revocation cascades to its refresh token.
    async fn revoke_access_token(&self, id: Uuid) -> Result<(), StoreError>;

    async fn create_refresh_token(&self, token: RefreshToken) -> Result<RefreshToken, StoreError>;

    async fn get_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError>;

    /// Conditional rotation step: revoke the refresh token and its parent
    /// access token iff the refresh token is not yet revoked, returning it
    /// only on that transition.
    async fn consume_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError>;

    /// Drop expired codes and tokens; returns how many records went away.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
struct Collections {
    clients: HashMap<String, Client>,
    auth_codes: HashMap<Uuid, AuthorizationCode>,
    access_tokens: HashMap<Uuid, AccessToken>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
}

/// In-memory store. A single lock covers all collections so cross-collection
/// invariants (the revocation cascade, conditional redemption) hold under
/// concurrent requests.
pub struct MemoryStore {
    config: Arc<OAuthConfig>,
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new(config: Arc<OAuthConfig>) -> Self {
        Self {
            config,
            inner: RwLock::new(Collections::default()),
        }
    }
}

#[async_trait]
impl OAuthStore for MemoryStore {
    async fn create_client(&self, draft: ClientDraft) -> Result<Client, StoreError> {
        let client = normalize(draft, &self.config)?;
        let mut inner = self.inner.write().await;

        if inner.clients.contains_key(&client.client_id) {
            return Err(StoreError::DuplicateClientId(client.client_id));
        }
        if inner.clients.values().any(|c| c.name == client.name) {
            return Err(StoreError::DuplicateName(client.name));
        }
        if let Some(domaine) = &client.domaine {
            if inner
                .clients
                .values()
                .any(|c| c.domaine.as_deref() == Some(domaine.as_str()))
            {
                return Err(StoreError::DuplicateDomain(domaine.clone()));
            }
        }

        inner
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(client)
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.clients.get(client_id).cloned())
    }

    async fn revoke_client(&self, client_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let client = inner
            .clients
            .get_mut(client_id)
            .ok_or_else(|| StoreError::ClientNotFound(client_id.to_string()))?;
        let now = Utc::now();
        client.revoked_at.get_or_insert(now);
        client.updated_at = now;
        Ok(())
    }

    async fn create_authorization_code(
        &self,
        code: AuthorizationCode,
    ) -> Result<AuthorizationCode, StoreError> {
        let mut inner = self.inner.write().await;
        inner.auth_codes.insert(code.id, code.clone());
        Ok(code)
    }

    async fn get_authorization_code(
        &self,
        id: Uuid,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.auth_codes.get(&id).cloned())
    }

    async fn find_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .auth_codes
            .values()
            .find(|c| c.client_id == client_id && c.code == code)
            .cloned())
    }

    async fn attach_authorization(
        &self,
        id: Uuid,
        user_id: &str,
        scope: &str,
    ) -> Result<AuthorizationCode, StoreError> {
        let mut inner = self.inner.write().await;
        let code = inner.auth_codes.get_mut(&id).ok_or(StoreError::CodeNotFound)?;
        code.user_id = Some(user_id.to_string());
        code.scope = scope.to_string();
        code.updated_at = Utc::now();
        Ok(code.clone())
    }

    async fn consume_authorization_code(
        &self,
        client_id: &str,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .auth_codes
            .values_mut()
            .find(|c| c.client_id == client_id && c.code == code);
        match record {
            Some(c) if c.revoked_at.is_none() => {
                let now = Utc::now();
                c.revoked_at = Some(now);
                c.updated_at = now;
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn create_access_token(&self, token: AccessToken) -> Result<AccessToken, StoreError> {
        let mut inner = self.inner.write().await;
        inner.access_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn get_access_token(&self, id: Uuid) -> Result<Option<AccessToken>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.access_tokens.get(&id).cloned())
    }

    async fn revoke_access_token(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let token = inner
            .access_tokens
            .get_mut(&id)
            .ok_or(StoreError::AccessTokenNotFound(id))?;
        token.revoked_at.get_or_insert(now);
        token.updated_at = now;

        // cascade: a refresh token never outlives its parent
        for refresh in inner
            .refresh_tokens
            .values_mut()
            .filter(|r| r.access_token_id == id && r.revoked_at.is_none())
        {
            refresh.revoked_at = Some(now);
            refresh.updated_at = now;
        }
        Ok(())
    }

    async fn create_refresh_token(&self, token: RefreshToken) -> Result<RefreshToken, StoreError> {
        let mut inner = self.inner.write().await;
        inner.refresh_tokens.insert(token.id, token.clone());
        Ok(token)
    }

    async fn get_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.refresh_tokens.get(&id).cloned())
    }

    async fn consume_refresh_token(&self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let parent_id = match inner.refresh_tokens.get_mut(&id) {
            Some(r) if r.revoked_at.is_none() => {
                r.revoked_at = Some(now);
                r.updated_at = now;
                r.access_token_id
            }
            _ => return Ok(None),
        };

        if let Some(parent) = inner.access_tokens.get_mut(&parent_id) {
            parent.revoked_at.get_or_insert(now);
            parent.updated_at = now;
        }

        Ok(inner.refresh_tokens.get(&id).cloned())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let before = inner.auth_codes.len() + inner.access_tokens.len() + inner.refresh_tokens.len();
        inner.auth_codes.retain(|_, c| c.expires_at >= now);
        inner.access_tokens.retain(|_, t| t.expires_at >= now);
        inner.refresh_tokens.retain(|_, t| t.expires_at >= now);
        let after = inner.auth_codes.len() + inner.access_tokens.len() + inner.refresh_tokens.len();
        Ok(before - after)
    }
}
