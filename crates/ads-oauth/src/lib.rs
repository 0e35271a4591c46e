use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};

mod error;

pub use error::AuthError;

/// Google authorization endpoint for installed applications
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scope required by the Google Ads API
pub const ADWORDS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// How long to wait for the browser to come back to the loopback listener
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// OAuth 2.0 token information
#[derive(Debug, Clone)]
pub struct OAuthToken {
    /// Access token for API requests
    pub access_token: SecretString,
    /// Refresh token for getting new access tokens
    pub refresh_token: SecretString,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Expiry time of the access token as Unix timestamp (seconds since epoch)
    pub expires_at: u64,
}

/// OAuth configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Authorization endpoint the user is sent to
    pub auth_uri: String,
    /// Token endpoint the authorization code is exchanged at
    pub token_uri: String,
    /// OAuth scope(s)
    pub scope: String,
    /// Address of the loopback listener; port 0 picks a free port
    pub callback_addr: SocketAddr,
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    /// Create new OAuth configuration with Google Ads defaults
    pub fn new(client_id: String, client_secret: SecretString) -> Self {
        Self {
            client_id,
            client_secret,
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            scope: ADWORDS_SCOPE.to_string(),
            callback_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

fn random_alphanumeric(len: usize) -> String {
    use rand::Rng;
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Compute the S256 challenge: base64url(SHA256(verifier))
pub fn pkce_challenge(verifier: &str) -> String {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate PKCE verifier and challenge
pub fn generate_pkce() -> Pkce {
    // 43-128 characters are allowed for the verifier
    let verifier = random_alphanumeric(64);
    let challenge = pkce_challenge(&verifier);
    Pkce {
        verifier,
        challenge,
    }
}

/// Generate the anti-CSRF `state` value sent with the authorization request
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

/// Generate authorization URL
pub fn authorization_url(
    config: &OAuthConfig,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> String {
    format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}&\
        code_challenge={}&\
        code_challenge_method=S256&\
        access_type=offline&\
        prompt=consent",
        config.auth_uri,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&config.scope),
        urlencoding::encode(state),
        urlencoding::encode(challenge),
    )
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Default, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

fn token_endpoint_error(status: reqwest::StatusCode, body: &str) -> AuthError {
    let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.error, parsed.error_description) {
        (Some(error), Some(description)) => format!("{}: {}", error, description),
        (Some(error), None) => error,
        _ => body.trim().to_string(),
    };
    AuthError::TokenEndpoint { status, message }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Exchange authorization code for tokens
pub async fn exchange_code(
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
) -> Result<OAuthToken, AuthError> {
    tracing::info!(token_uri = %config.token_uri, "exchanging authorization code for tokens");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.expose_secret().as_str()),
        ("code", code),
        ("code_verifier", verifier),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri),
    ];

    let response = client.post(&config.token_uri).form(&params).send().await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(token_endpoint_error(status, &body));
    }

    let token_response: TokenResponse = serde_json::from_str(&body)?;
    let refresh_token = token_response
        .refresh_token
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingRefreshToken)?;

    let token = OAuthToken {
        access_token: SecretString::new(token_response.access_token),
        refresh_token: SecretString::new(refresh_token),
        token_type: token_response
            .token_type
            .unwrap_or_else(|| "Bearer".to_string()),
        expires_at: unix_now() + token_response.expires_in.unwrap_or_default(),
    };

    tracing::info!(expires_at = token.expires_at, "obtained OAuth tokens");

    Ok(token)
}

#[derive(Deserialize)]
struct AuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<Result<String, AuthError>>>>>,
}

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization Successful!</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

fn failure_page(reason: &str) -> String {
    let reason = reason
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<html><body><h1>Authorization Failed</h1><p>Error: {}</p>\
        <p>You can close this window.</p></body></html>",
        reason
    )
}

async fn handle_callback(
    State(callback): State<CallbackState>,
    Query(params): Query<AuthCallback>,
) -> Html<String> {
    let (result, page) = match (params.error, params.code) {
        (Some(error), _) => {
            let page = failure_page(&error);
            (Err(AuthError::Denied(error)), page)
        }
        (None, Some(code)) if params.state.as_deref() == Some(&*callback.expected_state) => {
            (Ok(code), SUCCESS_PAGE.to_string())
        }
        (None, Some(_)) => (Err(AuthError::StateMismatch), failure_page("state mismatch")),
        (None, None) => (Err(AuthError::MissingCode), failure_page("no code received")),
    };

    // Only the first redirect decides the outcome
    if let Some(sender) = callback.sender.lock().await.take() {
        let _ = sender.send(result);
    }

    Html(page)
}

/// Run the installed application flow with a local callback listener.
///
/// `on_authorize` receives the authorization URL once the listener is ready;
/// it is expected to show it to the user and/or open a browser.
pub async fn start_auth_flow<F>(
    config: &OAuthConfig,
    on_authorize: F,
) -> Result<OAuthToken, AuthError>
where
    F: FnOnce(&str),
{
    let bind_error = |source: std::io::Error| AuthError::CallbackBind {
        addr: config.callback_addr,
        source,
    };
    let listener = tokio::net::TcpListener::bind(config.callback_addr)
        .await
        .map_err(bind_error)?;
    // Registered redirect must name the address actually bound
    let local_addr = listener.local_addr().map_err(bind_error)?;
    let redirect_uri = format!("http://{}/", local_addr);

    let pkce = generate_pkce();
    let state = generate_state();
    let auth_url = authorization_url(config, &redirect_uri, &pkce.challenge, &state);

    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(handle_callback))
        .with_state(CallbackState {
            expected_state: Arc::from(state),
            sender: Arc::new(Mutex::new(Some(code_tx))),
        });

    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::warn!(error = %e, "OAuth callback listener failed");
        }
    });

    tracing::debug!(%redirect_uri, "OAuth callback listener started");

    on_authorize(&auth_url);

    let received = tokio::time::timeout(config.callback_timeout, code_rx).await;

    // Stop listener; in-flight responses still complete
    let _ = shutdown_tx.send(());

    let code = match received {
        Err(_) => return Err(AuthError::Timeout(config.callback_timeout)),
        Ok(Err(_)) => return Err(AuthError::CallbackClosed),
        Ok(Ok(result)) => result?,
    };

    exchange_code(config, &code, &pkce.verifier, &redirect_uri).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> OAuthConfig {
        OAuthConfig::new(
            "1234.apps.googleusercontent.com".to_string(),
            SecretString::new("shh".to_string()),
        )
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generated_pkce_is_consistent() {
        let pkce = generate_pkce();
        assert_eq!(pkce.verifier.len(), 64);
        assert!(pkce.verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(pkce.challenge, pkce_challenge(&pkce.verifier));
        assert_ne!(generate_pkce().verifier, pkce.verifier);
    }

    #[test]
    fn authorization_url_requests_offline_access() {
        let config = test_config();
        let url = authorization_url(&config, "http://localhost:4242/", "challenge-value", "xyz");
        let parsed = url::Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        assert_eq!(parsed.path(), "/o/oauth2/auth");

        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "1234.apps.googleusercontent.com");
        assert_eq!(query["redirect_uri"], "http://localhost:4242/");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], ADWORDS_SCOPE);
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["code_challenge"], "challenge-value");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["prompt"], "consent");
        assert!(!query.contains_key("client_secret"));
    }

    #[test]
    fn token_endpoint_error_prefers_provider_description() {
        let err = token_endpoint_error(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":"invalid_client","error_description":"The OAuth client was not found."}"#,
        );
        assert_eq!(
            err.to_string(),
            "Failed to exchange authorization code (status 401 Unauthorized): \
             invalid_client: The OAuth client was not found."
        );

        let err = token_endpoint_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(err.to_string().ends_with(": upstream down"));
    }

    #[test]
    fn failure_page_escapes_markup() {
        let page = failure_page("<script>alert(1)</script>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("shh"));
    }
}
