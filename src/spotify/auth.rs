use std::{sync::Arc, time::Duration};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Url};
use tokio::sync::Mutex;

use crate::{
    config::SpotifySettings,
    error,
    management::{CredentialError, TokenManager},
    server::start_api_server,
    success,
    types::{PkceToken, Token, TokenResponse},
    utils, warning,
};

/// How long the user has to finish the consent screen.
const AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the code exchange request.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the OAuth 2.0 authorization code flow with PKCE.
///
/// Starts the local callback server, opens the provider's consent page in the
/// browser and waits for the callback handler to put the exchanged token into
/// `shared_state`. The token is then written to the credential store.
///
/// # Flow Implementation
/// 1. **Code Verifier Generation**: Creates cryptographically random verifier
/// 2. **Challenge Creation**: Derives SHA256 challenge from verifier
/// 3. **Authorization Request**: Directs user to Spotify with challenge
/// 4. **Local Callback**: Receives authorization code via temporary HTTP server
/// 5. **Token Exchange**: Exchanges code + verifier for access token
/// 6. **Token Storage**: Stores tokens for the tracker to use
pub async fn auth(settings: Arc<SpotifySettings>, shared_state: Arc<Mutex<Option<PkceToken>>>) {
    // generate PKCE verifier and challenge
    let code_verifier = utils::generate_code_verifier();
    let code_challenge = utils::generate_code_challenge(&code_verifier);

    // start API server
    let server_state = Arc::clone(&shared_state);
    let server_settings = Arc::clone(&settings);
    tokio::spawn(async move {
        if let Err(e) = start_api_server(server_state, server_settings).await {
            warning!("Callback server stopped: {}", e);
        }
    });

    let auth_url = match authorize_url(&settings, &code_challenge) {
        Ok(url) => url,
        Err(e) => error!("Invalid authorization URL {}: {}", settings.auth_url, e),
    };

    // Store verifier in shared state before redirect
    {
        let mut lock = shared_state.lock().await;
        *lock = Some(PkceToken {
            code_verifier: code_verifier.clone(),
            token: None,
        });
    }

    // Open the authorization URL in the default browser
    if webbrowser::open(auth_url.as_str()).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }

    // wait for callback to be hit
    let token = wait_for_token(shared_state).await;

    match token {
        Some(t) => {
            let token_manager = TokenManager::new(t);
            if let Err(e) = token_manager.persist().await {
                error!("Failed to save token to cache: {}", e);
            }

            success!("Authentication successful!");
        }
        None => {
            error!("Authentication failed or timed out.");
        }
    }
}

pub fn authorize_url(settings: &SpotifySettings, code_challenge: &str) -> Result<Url, String> {
    Url::parse_with_params(
        &settings.auth_url,
        &[
            ("client_id", settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
            ("scope", settings.scope.as_str()),
        ],
    )
    .map_err(|e| e.to_string())
}

async fn wait_for_token(shared_state: Arc<Mutex<Option<PkceToken>>>) -> Option<Token> {
    use std::time::Instant;

    let pb = ProgressBar::new_spinner();
    pb.set_message("Waiting for authorization in the browser...");
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }

    let start = Instant::now();

    while start.elapsed() < AUTH_TIMEOUT {
        let lock = shared_state.lock().await;
        if let Some(pkce_token) = lock.as_ref() {
            if let Some(token) = &pkce_token.token {
                pb.finish_and_clear();
                return Some(token.clone());
            }
        }
        drop(lock);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    pb.finish_and_clear();
    None
}

pub async fn refresh_token(
    client: &Client,
    settings: &SpotifySettings,
    refresh_token: &str,
) -> Result<Token, CredentialError> {
    let res = client
        .post(&settings.token_url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", settings.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| CredentialError::Network(e.to_string()))?;

    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(if status.is_server_error() {
            CredentialError::Network(format!("{status}: {body}"))
        } else {
            CredentialError::Rejected(format!("{status}: {body}"))
        });
    }

    let json: TokenResponse = res
        .json()
        .await
        .map_err(|e| CredentialError::Network(e.to_string()))?;

    Ok(into_token(json))
}

pub async fn exchange_code_pkce(
    settings: &SpotifySettings,
    code: &str,
    verifier: &str,
) -> Result<Token, reqwest::Error> {
    let client = Client::builder().timeout(EXCHANGE_TIMEOUT).build()?;
    let res = client
        .post(&settings.token_url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", settings.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", settings.redirect_uri.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let json: TokenResponse = res.json().await?;

    Ok(into_token(json))
}

fn into_token(json: TokenResponse) -> Token {
    Token {
        access_token: json.access_token,
        refresh_token: json.refresh_token.unwrap_or_default(),
        scope: json.scope.unwrap_or_default(),
        expires_in: json.expires_in.unwrap_or(3600),
        obtained_at: Utc::now().timestamp().max(0) as u64,
    }
}
