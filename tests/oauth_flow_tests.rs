//! End-to-end flows over the OAuth router
//!
//! Drives the axum router with tower `oneshot`: authorization-code with
//! PKCE through the login dialog, client-credentials, password, refresh
//! rotation, and the protocol boundary behaviors of the token endpoint.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tower::util::ServiceExt;
use uuid::Uuid;

use tokensmith::config::OAuthConfig;
use tokensmith::models::{Client, ClientDraft, ClientProfile};
use tokensmith::oauth::{oauth_router, AppState};
use tokensmith::users::MemoryUsers;
use tokensmith::TokenSigner;

// RFC 7636 Appendix B test vector
const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CODE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn test_config() -> OAuthConfig {
    OAuthConfig {
        secret_key: "integration-test-secret".to_string(),
        ..Default::default()
    }
}

async fn test_app() -> (Router, AppState, Arc<MemoryUsers>) {
    let users = Arc::new(MemoryUsers::new());
    users.add_user("u1", "p1", "u1", "read write").await;
    users.add_user("u2", "p2", "u2", "profile email").await;

    let state = AppState::in_memory(test_config(), users.clone()).unwrap();
    let app = oauth_router().with_state(state.clone());
    (app, state, users)
}

/// Register a confidential external client with a two-token scope.
async fn web_client(state: &AppState) -> Client {
    state
        .store
        .create_client(ClientDraft {
            name: "Scenario App".to_string(),
            profile: ClientProfile::Web,
            redirect_uris: vec!["https://app/cb".to_string()],
            scope: "read write".to_string(),
            internal: false,
            domaine: Some("https://app".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}

/// Register the public internal client of scenario 3.
async fn native_internal_client(state: &AppState) -> Client {
    state
        .store
        .create_client(ClientDraft {
            name: "First Party CLI".to_string(),
            profile: ClientProfile::Native,
            scope: "*".to_string(),
            internal: true,
            ..Default::default()
        })
        .await
        .unwrap()
}

async fn get_response(app: &Router, uri: &str) -> (StatusCode, String, String) {
    let request = Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, location, String::from_utf8_lossy(&body).to_string())
}

fn encode_form(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

async fn post_form(app: &Router, uri: &str, params: &[(&str, &str)]) -> (StatusCode, String) {
    let request = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(encode_form(params)))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (status, location)
}

async fn post_form_json(
    app: &Router,
    uri: &str,
    params: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(encode_form(params)))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::json!({}));
    (status, json)
}

fn query_param(location: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

/// Walk the front channel: authorize, dialog, login, and return the
/// authorization code handed back to the client.
async fn obtain_code(app: &Router, client: &Client, scope: &str, state_value: &str) -> String {
    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
        client.client_id,
        urlencoding::encode("https://app/cb"),
        urlencoding::encode(scope),
        state_value,
        CODE_CHALLENGE,
    );

    let (status, location, _) = get_response(app, &uri).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.starts_with("/oauth/dialog?p="));
    let sealed = location.strip_prefix("/oauth/dialog?p=").unwrap().to_string();

    // the dialog renders for the pending request
    let (status, _, body) = get_response(app, &location).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Scenario App"));

    // resource owner signs in and approves
    let (status, location) = post_form(
        app,
        "/oauth/authorize",
        &[
            ("p", sealed.as_str()),
            ("username", "u1"),
            ("password", "p1"),
            ("decision", "approve"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(location.starts_with("https://app/cb"));
    assert_eq!(query_param(&location, "state").as_deref(), Some(state_value));

    query_param(&location, "code").expect("authorization code in redirect")
}

// ============================================================================
// Scenario 1: Authorization Code with PKCE (S256)
// ============================================================================

#[tokio::test]
async fn test_authorization_code_flow_with_pkce() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "s1").await;

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["access_token"].is_string());
    assert!(json["refresh_token"].is_string());
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(
        json["expires_in"],
        state.config.access_token_expires_in.confidential_external
    );

    let signer = TokenSigner::new(&state.config.signing).unwrap();
    let claims = signer.verify(json["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.client_id, client.client_id);
    // subject scope "read write" intersected with the requested "read"
    assert_eq!(claims.scope.as_deref(), Some("read"));
    assert_eq!(claims.aud, "https://app");
}

// ============================================================================
// Scenario 2: Client Credentials
// ============================================================================

#[tokio::test]
async fn test_client_credentials_flow() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("scope", "read"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["access_token"].is_string());
    assert!(json["refresh_token"].is_null());

    let signer = TokenSigner::new(&state.config.signing).unwrap();
    let claims = signer.verify(json["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.sub, client.client_id);
    assert_eq!(claims.scope.as_deref(), Some("read"));
}

#[tokio::test]
async fn test_client_credentials_via_basic_auth() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let encoded = BASE64.encode(format!("{}:{}", client.client_id, secret));
    let request = Request::builder()
        .uri("/oauth/token")
        .method("POST")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("authorization", format!("Basic {encoded}"))
        .body(Body::from("grant_type=client_credentials&scope=read"))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Scenario 3: Password grant, public internal client
// ============================================================================

#[tokio::test]
async fn test_password_grant_public_internal_client() {
    let (app, state, _) = test_app().await;
    let client = native_internal_client(&state).await;

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "password"),
            ("username", "u2"),
            ("password", "p2"),
            ("client_id", &client.client_id),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // public client: no refresh token
    assert!(json["refresh_token"].is_null());
    assert_eq!(
        json["expires_in"],
        state.config.access_token_expires_in.public_internal
    );

    // the wildcard client scope lets the subject scope through unchanged
    let signer = TokenSigner::new(&state.config.signing).unwrap();
    let claims = signer.verify(json["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.sub, "u2");
    assert_eq!(claims.scope.as_deref(), Some("profile email"));
}

#[tokio::test]
async fn test_password_grant_bad_credentials() {
    let (app, state, _) = test_app().await;
    let client = native_internal_client(&state).await;

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "password"),
            ("username", "u2"),
            ("password", "not-the-password"),
            ("client_id", &client.client_id),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

// ============================================================================
// Scenario 4: Refresh rotation revokes the predecessor pair
// ============================================================================

#[tokio::test]
async fn test_refresh_token_rotation() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "s4").await;
    let (_, first) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
    .await;

    let refresh_jwt = first["refresh_token"].as_str().unwrap().to_string();

    let (status, second) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_jwt),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(second["access_token"].is_string());
    assert!(second["refresh_token"].is_string());
    assert_ne!(second["access_token"], first["access_token"]);

    // the previously returned access token's jti is now revoked
    let signer = TokenSigner::new(&state.config.signing).unwrap();
    let old_claims = signer.verify(first["access_token"].as_str().unwrap()).unwrap();
    let old_jti: Uuid = old_claims.jti.parse().unwrap();
    let old_record = state.store.get_access_token(old_jti).await.unwrap().unwrap();
    assert!(old_record.revoked_at.is_some());

    // the new token keeps the subject and scope
    let new_claims = signer.verify(second["access_token"].as_str().unwrap()).unwrap();
    assert_eq!(new_claims.sub, "u1");
    assert_eq!(new_claims.scope.as_deref(), Some("read"));

    // the consumed refresh token cannot be replayed
    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", &refresh_jwt),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

// ============================================================================
// Scenario 5: Reused authorization code
// ============================================================================

#[tokio::test]
async fn test_authorization_code_single_use() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "s5").await;
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", "https://app/cb"),
        ("client_id", client.client_id.as_str()),
        ("client_secret", secret.as_str()),
        ("code_verifier", CODE_VERIFIER),
    ];

    let (status, _) = post_form_json(&app, "/oauth/token", &params).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_form_json(&app, "/oauth/token", &params).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_concurrent_redemption_single_success() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "s5c").await;
    let params: Vec<(String, String)> = vec![
        ("grant_type".into(), "authorization_code".into()),
        ("code".into(), code.clone()),
        ("redirect_uri".into(), "https://app/cb".into()),
        ("client_id".into(), client.client_id.clone()),
        ("client_secret".into(), secret.clone()),
        ("code_verifier".into(), CODE_VERIFIER.into()),
    ];
    let borrowed: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let (first, second) = tokio::join!(
        post_form_json(&app, "/oauth/token", &borrowed),
        post_form_json(&app, "/oauth/token", &borrowed),
    );

    let successes = [first.0, second.0]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(successes, 1);
}

// ============================================================================
// Scenario 6: Invalid PKCE verifier
// ============================================================================

#[tokio::test]
async fn test_invalid_pkce_verifier() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "s6").await;
    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", "wrong"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");

    // the failed verification did not burn the code
    let (status, _) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Token endpoint boundary behaviors
// ============================================================================

#[tokio::test]
async fn test_missing_client_id() {
    let (app, _, _) = test_app().await;
    let (status, json) =
        post_form_json(&app, "/oauth/token", &[("grant_type", "client_credentials")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_revoked_client_is_unauthorized() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();
    state.store.revoke_client(&client.client_id).await.unwrap();

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_client");
}

#[tokio::test]
async fn test_wrong_client_secret() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", &client.client_id),
            ("client_secret", "deadbeef"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid_client");
}

#[tokio::test]
async fn test_missing_secret_for_confidential_client() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("client_id", &client.client_id),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_grant_type() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "device_code"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_mismatched_redirect_uri() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "sb").await;
    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://evil/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_scope_broadening_refused() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let code = obtain_code(&app, &client, "read", "sb2").await;
    let (_, first) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://app/cb"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
            ("code_verifier", CODE_VERIFIER),
        ],
    )
    .await;
    let refresh_jwt = first["refresh_token"].as_str().unwrap();

    // "write" is within the client scope but broader than the issued "read"
    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_jwt),
            ("scope", "write"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_scope");
}

#[tokio::test]
async fn test_scope_outside_client_scope() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;
    let secret = client.secret_key.clone().unwrap();

    let (status, json) = post_form_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "client_credentials"),
            ("scope", "admin"),
            ("client_id", &client.client_id),
            ("client_secret", &secret),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_scope");
}

// ============================================================================
// Front channel behaviors
// ============================================================================

#[tokio::test]
async fn test_authorize_unknown_client_renders_error_page() {
    let (app, _, _) = test_app().await;
    let (status, location, body) = get_response(
        &app,
        "/oauth/authorize?response_type=code&client_id=nobody&redirect_uri=https%3A%2F%2Fapp%2Fcb",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(location.is_empty());
    assert!(body.contains("invalid_client"));
}

#[tokio::test]
async fn test_authorize_unregistered_redirect_uri_renders_error_page() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}",
        client.client_id,
        urlencoding::encode("https://evil/cb"),
    );
    let (status, location, body) = get_response(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(location.is_empty());
    assert!(body.contains("invalid_request"));
}

#[tokio::test]
async fn test_authorize_invalid_scope_redirects() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=admin&state=s9",
        client.client_id,
        urlencoding::encode("https://app/cb"),
    );
    let (status, location, _) = get_response(&app, &uri).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(query_param(&location, "error").as_deref(), Some("invalid_scope"));
    assert_eq!(query_param(&location, "state").as_deref(), Some("s9"));
}

#[tokio::test]
async fn test_dialog_cancel_redirects_access_denied() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=read&state=s10",
        client.client_id,
        urlencoding::encode("https://app/cb"),
    );
    let (_, location, _) = get_response(&app, &uri).await;
    let sealed = location.strip_prefix("/oauth/dialog?p=").unwrap();

    let (status, location) = post_form(
        &app,
        "/oauth/authorize",
        &[("p", sealed), ("decision", "cancel")],
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("access_denied")
    );
    assert_eq!(query_param(&location, "state").as_deref(), Some("s10"));
}

#[tokio::test]
async fn test_tampered_dialog_payload_rejected() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=read",
        client.client_id,
        urlencoding::encode("https://app/cb"),
    );
    let (_, location, _) = get_response(&app, &uri).await;
    let sealed = location.strip_prefix("/oauth/dialog?p=").unwrap();

    // swap the authenticated body for another record id, keeping the tag
    let forged_body = base64_url::encode(
        serde_json::json!({ "code_id": Uuid::new_v4() })
            .to_string()
            .as_bytes(),
    );
    let forged = format!("{}.{}", forged_body, sealed.split_once('.').unwrap().1);

    let (status, _) = post_form(
        &app,
        "/oauth/authorize",
        &[
            ("p", forged.as_str()),
            ("username", "u1"),
            ("password", "p1"),
            ("decision", "approve"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_login_rerenders_dialog() {
    let (app, state, _) = test_app().await;
    let client = web_client(&state).await;

    let uri = format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&scope=read",
        client.client_id,
        urlencoding::encode("https://app/cb"),
    );
    let (_, location, _) = get_response(&app, &uri).await;
    let sealed = location.strip_prefix("/oauth/dialog?p=").unwrap();

    let request = Request::builder()
        .uri("/oauth/authorize")
        .method("POST")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(encode_form(&[
            ("p", sealed),
            ("username", "u1"),
            ("password", "wrong"),
            ("decision", "approve"),
        ])))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("invalid username or password"));
}

#[tokio::test]
async fn test_callback_echoes_query() {
    let (app, _, _) = test_app().await;
    let request = Request::builder()
        .uri("/oauth/callback?code=abc&state=xyz")
        .method("GET")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "abc");
    assert_eq!(json["state"], "xyz");
}
