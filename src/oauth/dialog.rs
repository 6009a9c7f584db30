//! Login dialog
//!
//! The authorize endpoint never exposes the authorization-code record id
//! directly: it hands the user agent an HMAC-sealed payload so a tampered
//! value cannot make the server attach a login to someone else's pending
//! code. The dialog recovers the pending request from that payload, renders
//! the provider-branded login form, and posts the decision back to
//! `POST /oauth/authorize`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::config::OAuthConfig;
use crate::crypto;

/// Contents of the sealed blob passed between `/authorize` and `/dialog`.
#[derive(Debug, Serialize, Deserialize)]
struct DialogPayload {
    code_id: Uuid,
}

/// Seal an authorization-code id into a tamper-evident blob.
pub(crate) fn seal_code_id(config: &OAuthConfig, code_id: Uuid) -> String {
    let payload = DialogPayload { code_id };
    let bytes = serde_json::to_vec(&payload).expect("payload serializes");
    crypto::seal_payload(config, &bytes)
}

/// Recover the authorization-code id; `None` on any tampering or decoding
/// failure.
pub(crate) fn open_code_id(config: &OAuthConfig, sealed: &str) -> Option<Uuid> {
    let bytes = crypto::open_payload(config, sealed)?;
    let payload: DialogPayload = serde_json::from_slice(&bytes).ok()?;
    Some(payload.code_id)
}

/// Minimal HTML escaping for values interpolated into the dialog markup.
fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the login dialog form. `error` re-renders after a failed login.
pub(crate) fn render_login_dialog(
    provider_name: &str,
    client_name: &str,
    scope: &str,
    sealed: &str,
    error: Option<&str>,
) -> String {
    let scopes = scope.split_whitespace().collect::<Vec<_>>();
    let scope_list = if scopes.is_empty() {
        "<p>No specific permissions requested</p>".to_string()
    } else {
        scopes
            .iter()
            .map(|s| format!("<div class='scope-item'>&bull; {}</div>", escape_html(s)))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let error_banner = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{provider} - Sign in</title>
    <style>
        body {{ font-family: Arial, sans-serif; max-width: 420px; margin: 50px auto; padding: 20px; }}
        .dialog-box {{ border: 1px solid #ccc; padding: 20px; border-radius: 5px; }}
        .scopes {{ margin: 16px 0; }}
        .scope-item {{ padding: 4px 0; }}
        .error {{ color: #c0392b; }}
        label {{ display: block; margin-top: 12px; }}
        input {{ width: 100%; padding: 6px; }}
        .buttons {{ margin-top: 20px; }}
        button {{ padding: 10px 20px; margin-right: 10px; cursor: pointer; }}
        .approve {{ background-color: #4CAF50; color: white; border: none; }}
        .cancel {{ background-color: #f44336; color: white; border: none; }}
    </style>
</head>
<body>
    <div class="dialog-box">
        <h2>{provider}</h2>
        <p><strong>{client}</strong> is requesting access to your account.</p>
        <div class="scopes">{scope_list}</div>
        {error_banner}
        <form method="POST" action="/oauth/authorize">
            <input type="hidden" name="p" value="{sealed}">
            <label>Username <input type="text" name="username" autocomplete="username"></label>
            <label>Password <input type="password" name="password" autocomplete="current-password"></label>
            <div class="buttons">
                <button type="submit" name="decision" value="approve" class="approve">Sign in</button>
                <button type="submit" name="decision" value="cancel" class="cancel">Cancel</button>
            </div>
        </form>
    </div>
</body>
</html>"#,
        provider = escape_html(provider_name),
        client = escape_html(client_name),
        scope_list = scope_list,
        error_banner = error_banner,
        sealed = escape_html(sealed),
    )
}

#[derive(Debug, Deserialize)]
pub struct DialogQuery {
    pub p: String,
}

/// GET /oauth/dialog?p=<sealed> - render the login dialog for a pending
/// authorization request.
pub async fn dialog_get(
    State(state): State<AppState>,
    Query(query): Query<DialogQuery>,
) -> Response {
    let Some(code_id) = open_code_id(&state.config, &query.p) else {
        return super::authorize::error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "the authorization payload is invalid",
        );
    };

    let code = match state.store.get_authorization_code(code_id).await {
        Ok(Some(code)) => code,
        Ok(None) => {
            return super::authorize::error_page(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "unknown authorization request",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load authorization code");
            return super::authorize::error_page(
                StatusCode::BAD_REQUEST,
                "server_error",
                "internal server error",
            );
        }
    };

    if code.revoked_at.is_some() || code.is_expired(chrono::Utc::now()) {
        return super::authorize::error_page(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "the authorization request has expired",
        );
    }

    let client_name = match state.store.get_client(&code.client_id).await {
        Ok(Some(client)) => client.name,
        _ => code.client_id.clone(),
    };

    Html(render_login_dialog(
        &state.config.provider_name,
        &client_name,
        &code.scope,
        &query.p,
        None,
    ))
    .into_response()
}
