//! # tokensmith
//!
//! An OAuth 2.0 authorization server core: client registration and secret
//! verification, the authorization-code (with PKCE), client-credentials,
//! resource-owner-password and refresh-token grants, scope negotiation, and
//! the persistence and signing of the credentials behind them.
//!
//! The crate is transport-thin by design: [`oauth::oauth_router`] returns an
//! axum `Router` ready to be mounted, [`oauth::AppState`] carries the
//! process configuration, the entity store, the token signer and the
//! resource-owner authenticator. Everything else - HTTP serving, user
//! management, the persistence engine - plugs in at those seams.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokensmith::config::OAuthConfig;
//! use tokensmith::oauth::{oauth_router, AppState};
//! use tokensmith::users::MemoryUsers;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = Arc::new(MemoryUsers::new());
//!     let state = AppState::in_memory(OAuthConfig::from_env(), users)?;
//!     let app = oauth_router().with_state(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod jwt;
pub mod models;
pub mod oauth;
pub mod pkce;
pub mod scope;
pub mod store;
pub mod users;

pub use config::{HmacAlgorithm, OAuthConfig, SigningConfig, TtlTable};
pub use error::{ErrorBody, ProtocolError};
pub use issuer::{RequestMeta, TokenGrant, TokenIssuer};
pub use jwt::{Claims, JwtError, TokenSigner};
pub use models::{
    normalize, AccessToken, AuthorizationCode, Client, ClientDraft, ClientProfile, ClientType,
    ClientValidationError, GrantType, RefreshToken,
};
pub use oauth::{oauth_router, AppState};
pub use pkce::CodeChallengeMethod;
pub use store::{MemoryStore, OAuthStore, StoreError};
pub use users::{AuthenticatedUser, MemoryUsers, UserAuthenticator};
