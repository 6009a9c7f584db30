//! Token factory
//!
//! One entry point turns a (client, grant, scope, subject) quadruple into a
//! signed token response. The access-token record is durable before its JWT
//! is produced: the JWT's `jti` is the record id, and a client presenting
//! the token before the record commits would appear invalid.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::OAuthConfig;
use crate::error::ProtocolError;
use crate::jwt::{Claims, TokenSigner};
use crate::models::{AccessToken, Client, ClientType, GrantType, RefreshToken};
use crate::store::OAuthStore;

/// Request-scoped data the factory needs: no globals.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// The server's own base URL as seen by this request; becomes `iss`.
    pub base_url: String,
    /// The caller's User-Agent, recorded on the access token.
    pub user_agent: Option<String>,
}

/// Successful token response body per RFC 6749 Section 5.1.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Mints signed access and refresh tokens and persists their records.
#[derive(Clone)]
pub struct TokenIssuer {
    config: Arc<OAuthConfig>,
    store: Arc<dyn OAuthStore>,
    signer: Arc<TokenSigner>,
}

impl TokenIssuer {
    pub fn new(
        config: Arc<OAuthConfig>,
        store: Arc<dyn OAuthStore>,
        signer: Arc<TokenSigner>,
    ) -> Self {
        Self {
            config,
            store,
            signer,
        }
    }

    /// Issue tokens for a subject under a grant.
    ///
    /// A refresh token accompanies the access token iff the grant is not
    /// `client_credentials` or `implicit` and the client is confidential.
    pub async fn issue(
        &self,
        client: &Client,
        grant: GrantType,
        scope: &str,
        subject: &str,
        meta: &RequestMeta,
    ) -> Result<TokenGrant, ProtocolError> {
        if !client.allows_grant(grant) {
            return Err(ProtocolError::unauthorized_client(format!(
                "client is not authorized for the {} grant",
                grant.as_str()
            )));
        }

        let now = Utc::now();
        let access_ttl = self
            .config
            .access_token_expires_in
            .seconds_for(client.client_type, client.internal);

        let access = AccessToken {
            id: Uuid::new_v4(),
            client_id: client.client_id.clone(),
            user_id: subject.to_string(),
            name: client.name.clone(),
            scope: scope.to_string(),
            expires_at: now + Duration::seconds(access_ttl),
            user_agent: meta.user_agent.clone(),
            revoked_at: None,
            created_at: now,
            updated_at: now,
        };
        let access = self.store.create_access_token(access).await?;

        let access_jwt = self.signer.sign(&Claims {
            iss: meta.base_url.clone(),
            aud: client.audience().to_string(),
            azp: client.audience().to_string(),
            sub: subject.to_string(),
            client_id: client.client_id.clone(),
            scope: if scope.is_empty() {
                None
            } else {
                Some(scope.to_string())
            },
            jti: access.id.to_string(),
            exp: access.expires_at.timestamp(),
        })?;

        let issues_refresh = !matches!(grant, GrantType::ClientCredentials | GrantType::Implicit)
            && client.client_type == ClientType::Confidential;

        let refresh_jwt = if issues_refresh {
            let refresh_ttl = self
                .config
                .refresh_token_expires_in
                .seconds_for(client.client_type, client.internal);
            let refresh = RefreshToken {
                id: Uuid::new_v4(),
                access_token_id: access.id,
                expires_at: now + Duration::seconds(refresh_ttl),
                revoked_at: None,
                created_at: now,
                updated_at: now,
            };
            let refresh = self.store.create_refresh_token(refresh).await?;

            Some(self.signer.sign(&Claims {
                iss: meta.base_url.clone(),
                aud: client.audience().to_string(),
                azp: client.audience().to_string(),
                sub: subject.to_string(),
                client_id: client.client_id.clone(),
                scope: None,
                jti: refresh.id.to_string(),
                exp: refresh.expires_at.timestamp(),
            })?)
        } else {
            None
        };

        tracing::debug!(
            client_id = %client.client_id,
            grant = grant.as_str(),
            refresh = refresh_jwt.is_some(),
            "issued access token"
        );

        Ok(TokenGrant {
            access_token: access_jwt,
            token_type: self.config.token_type.clone(),
            expires_in: access_ttl,
            refresh_token: refresh_jwt,
        })
    }
}
