//! Token endpoint (back channel)
//!
//! `POST /oauth/token` with an `application/x-www-form-urlencoded` body.
//! Client authentication accepts HTTP Basic or body fields; the common
//! preamble applies to every grant, then dispatch hands off to the four
//! grant handlers. Protocol errors surface as RFC 6749 error bodies with
//! the status class each validation step mandates.

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::{Form, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{request_meta, AppState};
use crate::error::ProtocolError;
use crate::issuer::{RequestMeta, TokenGrant};
use crate::models::{Client, ClientType, GrantType};
use crate::pkce::{self, CodeChallengeMethod};
use crate::{crypto, scope};

#[derive(Debug, Deserialize)]
pub struct TokenRequestBody {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
}

/// Pull client credentials from the Basic header when present, falling back
/// to the body fields.
fn extract_client_credentials(
    headers: &HeaderMap,
    body: &TokenRequestBody,
) -> (Option<String>, Option<String>) {
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|pair| {
            pair.split_once(':')
                .map(|(id, secret)| (id.to_string(), secret.to_string()))
        });

    match basic {
        Some((id, secret)) => (Some(id), Some(secret)),
        None => (body.client_id.clone(), body.client_secret.clone()),
    }
}

/// POST /oauth/token - authenticate the client and dispatch on grant type.
pub async fn token_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(body): Form<TokenRequestBody>,
) -> Result<Json<TokenGrant>, ProtocolError> {
    let meta = request_meta(&headers);
    let (client_id, client_secret) = extract_client_credentials(&headers, &body);

    let client_id =
        client_id.ok_or_else(|| ProtocolError::invalid_request("client_id is required"))?;

    let client = state
        .store
        .get_client(&client_id)
        .await?
        .ok_or_else(|| ProtocolError::invalid_client("unknown client"))?;
    if client.is_revoked() {
        return Err(ProtocolError::invalid_client("client is revoked"));
    }

    if let Some(requested) = body.scope.as_deref() {
        if !scope::validate(&client.scope, requested) {
            return Err(ProtocolError::invalid_scope(
                "the requested scope is not allowed for this client",
            ));
        }
    }

    if client.client_type == ClientType::Confidential {
        let secret = client_secret
            .ok_or_else(|| ProtocolError::invalid_request("client_secret is required"))?;
        if !crypto::verify_client_secret(&state.config, &client.client_id, &secret) {
            return Err(ProtocolError::invalid_client("client authentication failed"));
        }
    }

    let grant_type = body
        .grant_type
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("grant_type is required"))?;

    match GrantType::parse(grant_type) {
        Some(GrantType::AuthorizationCode) => {
            authorization_code_grant(&state, &client, &body, &meta).await
        }
        Some(GrantType::ClientCredentials) => {
            client_credentials_grant(&state, &client, &body, &meta).await
        }
        Some(GrantType::Password) => password_grant(&state, &client, &body, &meta).await,
        Some(GrantType::RefreshToken) => refresh_token_grant(&state, &client, &body, &meta).await,
        _ => Err(ProtocolError::unsupported_grant_type(format!(
            "grant_type '{grant_type}' is not supported"
        ))),
    }
}

async fn authorization_code_grant(
    state: &AppState,
    client: &Client,
    body: &TokenRequestBody,
    meta: &RequestMeta,
) -> Result<Json<TokenGrant>, ProtocolError> {
    let code = body
        .code
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("code is required"))?;
    let redirect_uri = body
        .redirect_uri
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("redirect_uri is required"))?;

    let record = state
        .store
        .find_authorization_code(&client.client_id, code)
        .await?
        .ok_or_else(|| ProtocolError::invalid_grant("invalid authorization code"))?;

    if record.revoked_at.is_some() || record.is_expired(Utc::now()) {
        return Err(ProtocolError::invalid_grant("invalid authorization code"));
    }
    let user_id = record
        .user_id
        .clone()
        .ok_or_else(|| ProtocolError::invalid_grant("invalid authorization code"))?;

    if record.redirect_uri != redirect_uri {
        return Err(ProtocolError::invalid_grant("redirect_uri does not match"));
    }

    if let Some(challenge) = record.code_challenge.as_deref() {
        let verifier = body
            .code_verifier
            .as_deref()
            .ok_or_else(|| ProtocolError::invalid_request("code_verifier is required"))?;
        let method = record
            .code_challenge_method
            .unwrap_or(CodeChallengeMethod::Plain);
        if !pkce::verify(method, verifier, challenge) {
            return Err(ProtocolError::invalid_grant("PKCE verification failed"));
        }
    }

    // Conditional redemption commits before any token leaves the factory;
    // losing the race means another request already redeemed this code.
    let record = state
        .store
        .consume_authorization_code(&client.client_id, code)
        .await?
        .ok_or_else(|| ProtocolError::invalid_grant("invalid authorization code"))?;

    let grant = state
        .issuer
        .issue(
            client,
            GrantType::AuthorizationCode,
            &record.scope,
            &user_id,
            meta,
        )
        .await?;
    Ok(Json(grant))
}

async fn client_credentials_grant(
    state: &AppState,
    client: &Client,
    body: &TokenRequestBody,
    meta: &RequestMeta,
) -> Result<Json<TokenGrant>, ProtocolError> {
    if client.client_type != ClientType::Confidential {
        return Err(ProtocolError::unauthorized_client(
            "client_credentials requires a confidential client",
        ));
    }

    // the client is its own principal: its scope is the subject scope
    let resolved = scope::merge(&client.scope, body.scope.as_deref(), &client.scope);

    let grant = state
        .issuer
        .issue(
            client,
            GrantType::ClientCredentials,
            &resolved,
            &client.client_id,
            meta,
        )
        .await?;
    Ok(Json(grant))
}

async fn password_grant(
    state: &AppState,
    client: &Client,
    body: &TokenRequestBody,
    meta: &RequestMeta,
) -> Result<Json<TokenGrant>, ProtocolError> {
    let username = body
        .username
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("username is required"))?;
    let password = body
        .password
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("password is required"))?;

    let user = state
        .users
        .authenticate(username, password)
        .await
        .ok_or_else(|| ProtocolError::invalid_grant("resource owner authentication failed"))?;

    let resolved = scope::merge(&user.scope, body.scope.as_deref(), &client.scope);

    let grant = state
        .issuer
        .issue(client, GrantType::Password, &resolved, &user.user_id, meta)
        .await?;
    Ok(Json(grant))
}

async fn refresh_token_grant(
    state: &AppState,
    client: &Client,
    body: &TokenRequestBody,
    meta: &RequestMeta,
) -> Result<Json<TokenGrant>, ProtocolError> {
    let presented = body
        .refresh_token
        .as_deref()
        .ok_or_else(|| ProtocolError::invalid_request("refresh_token is required"))?;

    let claims = state
        .signer
        .verify(presented)
        .map_err(|_| ProtocolError::invalid_grant("invalid refresh token"))?;
    if claims.client_id != client.client_id {
        return Err(ProtocolError::invalid_grant("invalid refresh token"));
    }
    let jti: Uuid = claims
        .jti
        .parse()
        .map_err(|_| ProtocolError::invalid_grant("invalid refresh token"))?;

    let record = state
        .store
        .get_refresh_token(jti)
        .await?
        .ok_or_else(|| ProtocolError::invalid_grant("invalid refresh token"))?;
    if record.revoked_at.is_some() || record.is_expired(Utc::now()) {
        return Err(ProtocolError::invalid_grant("invalid refresh token"));
    }

    let parent = state
        .store
        .get_access_token(record.access_token_id)
        .await?
        .ok_or_else(|| ProtocolError::invalid_grant("invalid refresh token"))?;
    if parent.client_id != client.client_id {
        return Err(ProtocolError::invalid_grant("invalid refresh token"));
    }

    // Downscoping per RFC 6749 Section 6: a narrower scope is honored, a
    // broader one is refused.
    let next_scope = match body.scope.as_deref() {
        Some(requested) => {
            if !scope::is_subset(requested, &parent.scope) {
                return Err(ProtocolError::invalid_scope(
                    "requested scope exceeds the original grant",
                ));
            }
            requested.to_string()
        }
        None => parent.scope.clone(),
    };

    // Rotation: the presented pair dies before the replacement is minted.
    state
        .store
        .consume_refresh_token(jti)
        .await?
        .ok_or_else(|| ProtocolError::invalid_grant("invalid refresh token"))?;

    let grant = state
        .issuer
        .issue(
            client,
            GrantType::RefreshToken,
            &next_scope,
            &parent.user_id,
            meta,
        )
        .await?;
    Ok(Json(grant))
}
