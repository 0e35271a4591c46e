use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while running the installed application flow
#[derive(Debug, Error)]
pub enum AuthError {
    /// The loopback listener for the OAuth redirect could not be started
    #[error("Failed to start OAuth callback listener on {addr}: {source}")]
    CallbackBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The provider redirected back with an `error` parameter
    #[error("Authorization was not granted: {0}")]
    Denied(String),

    /// The `state` parameter of the redirect did not match the one we sent
    #[error("OAuth state mismatch in callback, refusing to continue")]
    StateMismatch,

    #[error("OAuth callback did not include an authorization code")]
    MissingCode,

    #[error("OAuth authorization timeout ({} seconds)", .0.as_secs())]
    Timeout(Duration),

    #[error("OAuth callback listener stopped before authorization completed")]
    CallbackClosed,

    #[error("Request to token endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer from the token endpoint
    #[error("Failed to exchange authorization code (status {status}): {message}")]
    TokenEndpoint {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("Failed to parse token response: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Token response did not include a refresh token")]
    MissingRefreshToken,
}
