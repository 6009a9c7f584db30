//! Persisted entities and the client write-path derivation
//!
//! Four record kinds back the server: clients, authorization codes, access
//! tokens and refresh tokens. Client classification (`client_type`), secret
//! presence and the grant set are derived from the submitted draft by
//! [`normalize`], a pure function the store invokes before every client
//! write, so reads can rely on the derived fields being consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::config::OAuthConfig;
use crate::crypto;
use crate::pkce::CodeChallengeMethod;
use crate::scope::WILDCARD;

/// How the client application is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientProfile {
    Web,
    UserAgentBased,
    Native,
}

/// Whether the client can protect a secret. Derived from the profile:
/// server-side web applications are confidential, everything else is public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Confidential,
    Public,
}

/// OAuth grant flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Implicit,
    AuthorizationCode,
    Password,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "implicit" => Some(Self::Implicit),
            "authorization_code" => Some(Self::AuthorizationCode),
            "password" => Some(Self::Password),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Implicit => "implicit",
            Self::AuthorizationCode => "authorization_code",
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// A registered client application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    pub profile: ClientProfile,
    pub client_type: ClientType,
    /// Present only for confidential clients; HMAC-derived from `client_id`.
    pub secret_key: Option<String>,
    pub grants: Vec<GrantType>,
    pub redirect_uris: Vec<String>,
    /// Space-separated scope tokens, or `*` for internal clients.
    pub scope: String,
    pub internal: bool,
    pub domaine: Option<String>,
    pub logo: Option<String>,
    pub description: Option<String>,
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// The audience (`aud`) and authorized party (`azp`) placed in issued
    /// tokens: the client's domain when it has one, its id otherwise.
    pub fn audience(&self) -> &str {
        self.domaine.as_deref().unwrap_or(&self.client_id)
    }

    /// Grant admission for the token factory. `refresh_token` never appears
    /// in the derived grant set: confidential clients are admitted to it by
    /// virtue of having received a refresh token at all.
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        match grant {
            GrantType::RefreshToken => self.client_type == ClientType::Confidential,
            _ => self.grants.contains(&grant),
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Client fields as submitted by the admin channel, before derivation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    pub profile: ClientProfile,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scope: String,
    pub internal: bool,
    #[serde(default)]
    pub domaine: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub legal_terms_accepted_at: Option<DateTime<Utc>>,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self::Web
    }
}

/// Validation failures on the client write-path. These surface to the admin
/// channel that submitted the draft, never to OAuth clients.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientValidationError {
    #[error("client name is required")]
    MissingName,
    #[error("non-internal clients must declare a non-empty scope")]
    EmptyScope,
    #[error("the wildcard scope is reserved for internal clients")]
    WildcardScope,
    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
    #[error("domaine is required for web and user-agent-based clients")]
    MissingDomain,
    #[error("invalid domaine URL: {0}")]
    InvalidDomain(String),
}

fn derive_client_type(profile: ClientProfile) -> ClientType {
    match profile {
        ClientProfile::Web => ClientType::Confidential,
        ClientProfile::UserAgentBased | ClientProfile::Native => ClientType::Public,
    }
}

fn derive_grants(client_type: ClientType, internal: bool) -> Vec<GrantType> {
    let mut grants = vec![GrantType::Implicit, GrantType::AuthorizationCode];
    if internal {
        grants.push(GrantType::Password);
    }
    // Any client able to hold a secret may authenticate as itself.
    if client_type == ClientType::Confidential {
        grants.push(GrantType::ClientCredentials);
    }
    grants
}

fn validate_absolute_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => !url.cannot_be_a_base() && url.has_host(),
        Err(_) => false,
    }
}

/// Derive and validate a full [`Client`] from a draft.
///
/// Runs at the store's write boundary: profile fixes the type, the type
/// fixes secret presence and (with the internal flag) the grant set, and the
/// scope and URI rules are enforced before anything is persisted.
pub fn normalize(draft: ClientDraft, config: &OAuthConfig) -> Result<Client, ClientValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ClientValidationError::MissingName);
    }

    let scope = draft.scope.trim().to_string();
    if !draft.internal {
        if scope.is_empty() {
            return Err(ClientValidationError::EmptyScope);
        }
        if scope == WILDCARD {
            return Err(ClientValidationError::WildcardScope);
        }
    }

    for uri in &draft.redirect_uris {
        if !validate_absolute_url(uri) {
            return Err(ClientValidationError::InvalidRedirectUri(uri.clone()));
        }
    }

    let needs_domain = matches!(
        draft.profile,
        ClientProfile::Web | ClientProfile::UserAgentBased
    );
    match (&draft.domaine, needs_domain) {
        (None, true) => return Err(ClientValidationError::MissingDomain),
        (Some(d), _) if !validate_absolute_url(d) => {
            return Err(ClientValidationError::InvalidDomain(d.clone()))
        }
        _ => {}
    }

    let client_id = crypto::generate_opaque(24);
    let client_type = derive_client_type(draft.profile);
    let secret_key = match client_type {
        ClientType::Confidential => Some(crypto::derive_client_secret(config, &client_id)),
        ClientType::Public => None,
    };
    let grants = derive_grants(client_type, draft.internal);
    let now = Utc::now();

    Ok(Client {
        client_id,
        name: draft.name,
        profile: draft.profile,
        client_type,
        secret_key,
        grants,
        redirect_uris: draft.redirect_uris,
        scope,
        internal: draft.internal,
        domaine: draft.domaine,
        logo: draft.logo,
        description: draft.description,
        legal_terms_accepted_at: draft.legal_terms_accepted_at,
        revoked_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Short-lived, single-use front-channel credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub id: Uuid,
    /// The opaque random value handed to the user agent.
    pub code: String,
    pub client_id: String,
    /// Attached once the resource owner authenticates at the dialog.
    pub user_id: Option<String>,
    /// The requested scope at creation, the resolved scope once authorized.
    pub scope: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Persisted record underlying a signed access token; its id is the JWT's
/// `jti` claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub client_id: String,
    pub user_id: String,
    pub name: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Persisted record underlying a signed refresh credential, paired with
/// exactly one parent access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub access_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
