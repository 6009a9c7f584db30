//! Authorization endpoint (front channel)
//!
//! Error handling follows RFC 6749 Section 4.1.2.1: until the client and its
//! `redirect_uri` are validated, errors render an HTML page because the
//! redirect target cannot be trusted; afterwards, errors travel back to the
//! client as `?error=...` query parameters with the echoed `state`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use super::dialog::{open_code_id, render_login_dialog, seal_code_id};
use super::AppState;
use crate::models::AuthorizationCode;
use crate::pkce::CodeChallengeMethod;
use crate::{crypto, scope};

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Render a front-channel error page. Used only while the redirect target is
/// untrusted (or absent).
pub(crate) fn error_page(status: StatusCode, error: &str, description: &str) -> Response {
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorization error</title></head>
<body>
    <h2>Authorization error</h2>
    <p><strong>{error}</strong></p>
    <p>{description}</p>
</body>
</html>"#
    );
    (status, Html(body)).into_response()
}

/// Redirect back to the client with an error, echoing `state`.
fn redirect_error(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let Ok(mut url) = url::Url::parse(redirect_uri) else {
        // already validated against the registered URIs; parse failure here
        // means the registration itself is broken
        return error_page(StatusCode::BAD_REQUEST, "server_error", "internal server error");
    };
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("error", error);
        params.append_pair("error_description", description);
        if let Some(s) = state {
            params.append_pair("state", s);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

/// Redirect back to the client with the authorization code.
fn redirect_with_code(redirect_uri: &str, code: &str, state: Option<&str>) -> Response {
    let Ok(mut url) = url::Url::parse(redirect_uri) else {
        return error_page(StatusCode::BAD_REQUEST, "server_error", "internal server error");
    };
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("code", code);
        if let Some(s) = state {
            params.append_pair("state", s);
        }
    }
    Redirect::to(url.as_str()).into_response()
}

/// GET /oauth/authorize - validate the front-channel request, persist a
/// pending authorization code and send the user agent to the login dialog.
pub async fn authorize_get(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    // Phase 1: client and redirect_uri. No redirect may happen before both
    // check out.
    let Some(client_id) = query.client_id.as_deref() else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "client_id is required",
        );
    };

    let client = match state.store.get_client(client_id).await {
        Ok(Some(client)) if !client.is_revoked() => client,
        Ok(_) => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "invalid_client",
                "unknown or revoked client",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load client");
            return error_page(StatusCode::BAD_REQUEST, "server_error", "internal server error");
        }
    };

    let Some(redirect_uri) = query.redirect_uri.as_deref() else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "redirect_uri is required",
        );
    };
    if !client.redirect_uris.iter().any(|u| u == redirect_uri) {
        return error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "redirect_uri is not registered for this client",
        );
    }

    // Phase 2: the redirect target is trusted, errors go back to the client.
    let state_param = query.state.as_deref();

    if query.response_type.as_deref() != Some("code") {
        return redirect_error(
            redirect_uri,
            "invalid_request",
            "response_type must be 'code'",
            state_param,
        );
    }

    let challenge_method = match (&query.code_challenge, &query.code_challenge_method) {
        (None, None) => None,
        (None, Some(_)) => {
            return redirect_error(
                redirect_uri,
                "invalid_request",
                "code_challenge_method without code_challenge",
                state_param,
            )
        }
        // RFC 7636: the method defaults to plain when only a challenge is sent
        (Some(_), None) => Some(CodeChallengeMethod::Plain),
        (Some(_), Some(m)) => match CodeChallengeMethod::parse(m) {
            Some(method) => Some(method),
            None => {
                return redirect_error(
                    redirect_uri,
                    "invalid_request",
                    "code_challenge_method must be 'plain' or 'S256'",
                    state_param,
                )
            }
        },
    };

    if let Some(requested) = query.scope.as_deref() {
        if !scope::validate(&client.scope, requested) {
            return redirect_error(
                redirect_uri,
                "invalid_scope",
                "the requested scope is not allowed for this client",
                state_param,
            );
        }
    }

    let now = Utc::now();
    let code = AuthorizationCode {
        id: Uuid::new_v4(),
        code: crypto::generate_opaque(32),
        client_id: client.client_id.clone(),
        user_id: None,
        scope: query.scope.clone().unwrap_or_default(),
        redirect_uri: redirect_uri.to_string(),
        state: query.state.clone(),
        code_challenge: query.code_challenge.clone(),
        code_challenge_method: challenge_method,
        expires_at: now + Duration::seconds(state.config.authorization_code_expires_in),
        revoked_at: None,
        created_at: now,
        updated_at: now,
    };

    let code = match state.store.create_authorization_code(code).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "failed to persist authorization code");
            return redirect_error(redirect_uri, "server_error", "internal server error", state_param);
        }
    };

    let sealed = seal_code_id(&state.config, code.id);
    Redirect::to(&format!("/oauth/dialog?p={sealed}")).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeForm {
    pub p: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub decision: Option<String>,
}

/// POST /oauth/authorize - consume the dialog submission: attach the
/// authenticated resource owner to the pending code, or report denial.
pub async fn authorize_post(
    State(state): State<AppState>,
    Form(form): Form<AuthorizeForm>,
) -> Response {
    let code_id = form
        .p
        .as_deref()
        .and_then(|p| open_code_id(&state.config, p));
    let Some(code_id) = code_id else {
        return error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "the authorization payload is invalid",
        );
    };

    let code = match state.store.get_authorization_code(code_id).await {
        Ok(Some(code)) => code,
        Ok(None) => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "unknown authorization request",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load authorization code");
            return error_page(StatusCode::BAD_REQUEST, "server_error", "internal server error");
        }
    };

    let client = match state.store.get_client(&code.client_id).await {
        Ok(Some(client)) if !client.is_revoked() => client,
        Ok(_) => {
            return error_page(
                StatusCode::BAD_REQUEST,
                "invalid_client",
                "unknown or revoked client",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load client");
            return error_page(StatusCode::BAD_REQUEST, "server_error", "internal server error");
        }
    };

    let state_param = code.state.as_deref();

    if form.decision.as_deref() != Some("approve") {
        return redirect_error(
            &code.redirect_uri,
            "access_denied",
            "the resource owner denied the request",
            state_param,
        );
    }

    if code.revoked_at.is_some() || code.is_expired(Utc::now()) {
        return redirect_error(
            &code.redirect_uri,
            "invalid_request",
            "the authorization request has expired",
            state_param,
        );
    }

    let sealed = form.p.as_deref().unwrap_or_default();
    let (username, password) = match (form.username.as_deref(), form.password.as_deref()) {
        (Some(u), Some(p)) if !u.is_empty() => (u, p),
        _ => {
            return Html(render_login_dialog(
                &state.config.provider_name,
                &client.name,
                &code.scope,
                sealed,
                Some("username and password are required"),
            ))
            .into_response()
        }
    };

    let Some(user) = state.users.authenticate(username, password).await else {
        return Html(render_login_dialog(
            &state.config.provider_name,
            &client.name,
            &code.scope,
            sealed,
            Some("invalid username or password"),
        ))
        .into_response();
    };

    let requested = if code.scope.is_empty() {
        None
    } else {
        Some(code.scope.as_str())
    };
    let resolved = scope::merge(&user.scope, requested, &client.scope);

    let code = match state
        .store
        .attach_authorization(code.id, &user.user_id, &resolved)
        .await
    {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "failed to attach authorization");
            return redirect_error(
                &code.redirect_uri,
                "server_error",
                "internal server error",
                state_param,
            );
        }
    };

    redirect_with_code(&code.redirect_uri, &code.code, code.state.as_deref())
}

/// GET /oauth/callback - diagnostic echo of the redirect parameters, handy
/// when exercising the flow by hand.
pub async fn callback_echo(Query(params): Query<HashMap<String, String>>) -> Response {
    Json(params).into_response()
}
