//! OAuth 2.0 HTTP endpoints
//!
//! Front channel: `GET /oauth/authorize` starts the authorization-code flow,
//! `GET /oauth/dialog` renders the login dialog, `POST /oauth/authorize`
//! consumes the resource owner's decision. Back channel:
//! `POST /oauth/token` issues tokens. `GET /oauth/callback` is a diagnostic
//! echo for manual testing.

pub mod authorize;
pub mod dialog;
pub mod token;

pub use authorize::{authorize_get, authorize_post, callback_echo};
pub use dialog::dialog_get;
pub use token::token_endpoint;

use axum::http::header::{HOST, USER_AGENT};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::config::OAuthConfig;
use crate::issuer::{RequestMeta, TokenIssuer};
use crate::jwt::{JwtError, TokenSigner};
use crate::store::{MemoryStore, OAuthStore};
use crate::users::UserAuthenticator;

/// Shared state behind every endpoint. Configuration is read-only after
/// startup; all mutable state lives in the store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OAuthConfig>,
    pub store: Arc<dyn OAuthStore>,
    pub users: Arc<dyn UserAuthenticator>,
    pub signer: Arc<TokenSigner>,
    pub issuer: TokenIssuer,
}

impl AppState {
    pub fn new(
        config: OAuthConfig,
        store: Arc<dyn OAuthStore>,
        users: Arc<dyn UserAuthenticator>,
    ) -> Result<Self, JwtError> {
        let config = Arc::new(config);
        let signer = Arc::new(TokenSigner::new(&config.signing)?);
        let issuer = TokenIssuer::new(config.clone(), store.clone(), signer.clone());
        Ok(Self {
            config,
            store,
            users,
            signer,
            issuer,
        })
    }

    /// State backed by the in-memory store, for tests and development.
    pub fn in_memory(
        config: OAuthConfig,
        users: Arc<dyn UserAuthenticator>,
    ) -> Result<Self, JwtError> {
        let store = Arc::new(MemoryStore::new(Arc::new(config.clone())));
        Self::new(config, store, users)
    }
}

/// Assemble the OAuth router.
pub fn oauth_router() -> Router<AppState> {
    Router::new()
        .route("/oauth/authorize", get(authorize_get).post(authorize_post))
        .route("/oauth/dialog", get(dialog_get))
        .route("/oauth/token", post(token_endpoint))
        .route("/oauth/callback", get(callback_echo))
}

/// Capture request-scoped data for the token factory: base URL and caller
/// user agent come from the request, never from a global.
pub(crate) fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    RequestMeta {
        base_url: format!("{scheme}://{host}"),
        user_agent,
    }
}
