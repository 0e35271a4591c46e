//! Interactive helper that obtains a Google Ads API refresh token through the
//! OAuth 2.0 installed application flow and optionally stores it in an env file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ads_oauth::{AuthError, DEFAULT_AUTH_URI, DEFAULT_TOKEN_URI, OAuthConfig};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub mod env_file;
pub mod prompt;

use env_file::{EnvFileError, REFRESH_TOKEN_KEY};
use prompt::{PromptError, Prompter};

const RULE: &str = "============================================================";

/// How a run ended when it did not fail
#[derive(Debug)]
pub enum Outcome {
    /// Token shown and written to the env file
    Saved(PathBuf),
    /// Token shown, user chose not to save it
    Shown,
    /// Token shown, but writing the env file failed
    SaveFailed(EnvFileError),
    /// Authorization went through but the provider issued no refresh token
    NoRefreshToken,
    /// User interrupted the run
    Cancelled,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Client ID is required!")]
    MissingClientId,

    #[error("Client Secret is required!")]
    MissingClientSecret,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("Failed to obtain refresh token: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Obtains a refresh token for the given OAuth client
#[allow(async_fn_in_trait)]
pub trait RefreshTokenSource {
    /// Progress meant for the user (e.g. the authorization URL) goes to `out`.
    async fn refresh_token(
        &self,
        client_id: String,
        client_secret: SecretString,
        out: &mut dyn Write,
    ) -> Result<SecretString, AuthError>;
}

/// Installed application flow against Google's OAuth endpoints
#[derive(Debug, Clone)]
pub struct InstalledAppFlow {
    pub auth_uri: String,
    pub token_uri: String,
    pub open_browser: bool,
}

impl InstalledAppFlow {
    /// Endpoints come from `OAUTH_AUTH_URI` / `OAUTH_TOKEN_URI` when set.
    pub fn from_env(open_browser: bool) -> Self {
        Self {
            auth_uri: std::env::var("OAUTH_AUTH_URI")
                .unwrap_or_else(|_| DEFAULT_AUTH_URI.to_string()),
            token_uri: std::env::var("OAUTH_TOKEN_URI")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URI.to_string()),
            open_browser,
        }
    }
}

impl RefreshTokenSource for InstalledAppFlow {
    async fn refresh_token(
        &self,
        client_id: String,
        client_secret: SecretString,
        out: &mut dyn Write,
    ) -> Result<SecretString, AuthError> {
        let mut config = OAuthConfig::new(client_id, client_secret);
        config.auth_uri = self.auth_uri.clone();
        config.token_uri = self.token_uri.clone();

        let open_browser = self.open_browser;
        let token = ads_oauth::start_auth_flow(&config, |auth_url| {
            if let Err(e) = show_authorization_url(out, auth_url, open_browser) {
                tracing::warn!(error = %e, "could not print authorization URL");
            }
        })
        .await?;

        Ok(token.refresh_token)
    }
}

fn show_authorization_url(
    out: &mut dyn Write,
    auth_url: &str,
    open_browser: bool,
) -> io::Result<()> {
    writeln!(out, "If the browser does not open, visit this URL to authorize access:")?;
    writeln!(out)?;
    writeln!(out, "  {}", auth_url)?;
    writeln!(out)?;
    out.flush()?;

    if open_browser {
        if let Err(e) = open::that(auth_url) {
            tracing::warn!(error = %e, "could not open browser");
        }
    }

    writeln!(out, "Waiting for authorization...")?;
    out.flush()
}

/// Walk the user through obtaining a refresh token.
///
/// An interrupted prompt ends the run with [`Outcome::Cancelled`].
pub async fn run<S: RefreshTokenSource>(
    prompter: &mut dyn Prompter,
    source: &S,
    env_path: &Path,
    out: &mut dyn Write,
) -> Result<Outcome, RunError> {
    match obtain_and_store(prompter, source, env_path, out).await {
        Err(RunError::Prompt(PromptError::Interrupted)) => Ok(Outcome::Cancelled),
        result => result,
    }
}

async fn obtain_and_store<S: RefreshTokenSource>(
    prompter: &mut dyn Prompter,
    source: &S,
    env_path: &Path,
    out: &mut dyn Write,
) -> Result<Outcome, RunError> {
    writeln!(out, "{}", RULE)?;
    writeln!(out, "GOOGLE ADS API - REFRESH TOKEN SETUP")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    writeln!(out, "You will need:")?;
    writeln!(out, "  1. Client ID from the Google Cloud Console")?;
    writeln!(out, "  2. Client Secret from the Google Cloud Console")?;
    writeln!(out)?;
    out.flush()?;

    let client_id = prompter.input("Client ID")?.trim().to_string();
    if client_id.is_empty() {
        return Err(RunError::MissingClientId);
    }

    let client_secret = prompter.input("Client Secret")?.trim().to_string();
    if client_secret.is_empty() {
        return Err(RunError::MissingClientSecret);
    }

    writeln!(out)?;
    writeln!(out, "Starting OAuth flow...")?;
    writeln!(out, "A browser window will open so you can authorize access.")?;
    writeln!(out)?;
    out.flush()?;

    tracing::debug!(%client_id, "starting installed application flow");

    let refresh_token = match source
        .refresh_token(client_id, SecretString::new(client_secret), out)
        .await
    {
        Ok(token) => token,
        Err(AuthError::MissingRefreshToken) => {
            writeln!(out, "Could not obtain the refresh token.")?;
            writeln!(out, "   Try again or check your credentials.")?;
            return Ok(Outcome::NoRefreshToken);
        }
        Err(e) => return Err(e.into()),
    };

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "REFRESH TOKEN OBTAINED SUCCESSFULLY!")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    writeln!(out, "Add this line to your .env file or secrets:")?;
    writeln!(out)?;
    writeln!(out, "{}={}", REFRESH_TOKEN_KEY, refresh_token.expose_secret())?;
    writeln!(out)?;
    writeln!(out, "IMPORTANT: Store this token securely!")?;
    writeln!(out, "   It will not be shown again.")?;
    writeln!(out)?;
    out.flush()?;

    let save = prompter.confirm(&format!(
        "Save it automatically to {}?",
        env_path.display()
    ))?;
    if !save {
        return Ok(Outcome::Shown);
    }

    match env_file::save_refresh_token(env_path, refresh_token.expose_secret()) {
        Ok(()) => {
            writeln!(out, "Refresh token saved to {}", env_path.display())?;
            Ok(Outcome::Saved(env_path.to_path_buf()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "saving refresh token failed");
            writeln!(out, "WARNING: {}", e)?;
            writeln!(out, "   You can add the line to the file manually.")?;
            Ok(Outcome::SaveFailed(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn authorization_url_goes_to_the_given_writer() {
        let mut out = Vec::new();
        show_authorization_url(&mut out, "https://accounts.example.test/auth?x=1", false).unwrap();

        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("\n  https://accounts.example.test/auth?x=1\n"));
        assert!(shown.ends_with("Waiting for authorization...\n"));
    }

    #[test]
    fn closed_output_is_an_error_not_a_panic() {
        let err = show_authorization_url(&mut BrokenPipe, "https://example.test", false)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
