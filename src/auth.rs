//! OAuth2 authorization-code flow against the Spotify accounts service.
//!
//! This module owns the two halves of token acquisition:
//! * building the `/authorize` redirect the relay sends the browser to,
//!   with the fixed scope string and a random `state` parameter, and
//! * exchanging the authorization code received on the callback for a
//!   bearer token (Basic authentication with the client credentials,
//!   form-encoded body, 5-second timeout).
//!
//! The exchange never retries: a failed login is surfaced to the user, who
//! retries manually. No token is cached or persisted; the result is handed
//! to the UI boundary exactly once per successful exchange.

use std::fmt;
use std::time::Duration;

use url::Url;
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
    http,
    protocol::{self, auth::TokenResponse},
};

/// Provider-issued bearer token.
///
/// Opaque and short-lived; expiry is provider-defined and not tracked
/// here. Owned by the UI session and destroyed with it. Debug output is
/// redacted.
#[derive(Clone, Eq, PartialEq, Hash, Redact)]
pub struct AccessToken(#[redact] String);

impl AccessToken {
    /// Wraps a provider-issued token.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the token is empty: an empty token means the
    /// session is logged out, never an authenticated one.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::invalid_argument("access token is empty"));
        }

        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Performs the authorization-code exchange with the provider.
#[derive(Clone)]
pub struct Authenticator {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
    token_endpoint: String,
}

impl Authenticator {
    /// The provider's authorization endpoint.
    const AUTHORIZE_ENDPOINT: &'static str = "https://accounts.spotify.com/authorize";

    /// The provider's token endpoint.
    const TOKEN_ENDPOINT: &'static str = "https://accounts.spotify.com/api/token";

    /// Scopes requested on login. Fixed: the dashboard needs playback
    /// state, playback control and the streaming profile fields.
    const SCOPE: &'static str = "streaming user-read-email user-read-private \
                                 user-read-playback-state user-modify-playback-state";

    /// Length of the random `state` parameter.
    const STATE_LENGTH: usize = 16;

    /// Deadline on the token exchange round-trip.
    const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates an authenticator sharing the application's HTTP client.
    #[must_use]
    pub fn new(config: &Config, http_client: &http::Client) -> Self {
        Self {
            client: http_client.unlimited.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_endpoint: Self::TOKEN_ENDPOINT.to_owned(),
        }
    }

    /// Redirects the exchange at a local stub.
    #[cfg(test)]
    fn set_token_endpoint(&mut self, url: impl Into<String>) {
        self.token_endpoint = url.into();
    }

    /// Generates a random alphanumeric `state` string.
    #[must_use]
    pub fn login_state() -> String {
        std::iter::repeat_with(fastrand::alphanumeric)
            .take(Self::STATE_LENGTH)
            .collect()
    }

    /// Builds the authorize redirect URL for `state`.
    ///
    /// Note that the callback does not validate `state` on return, in
    /// parity with the relay this replaces. That is a latent CSRF gap.
    ///
    /// # Panics
    ///
    /// Panics if the built-in authorize endpoint is not a valid URL.
    #[must_use]
    pub fn authorize_url(&self, state: &str) -> Url {
        let mut url = Url::parse(Self::AUTHORIZE_ENDPOINT).expect("invalid authorize endpoint");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", Self::SCOPE)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("state", state);

        url
    }

    /// Exchanges an authorization code for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `Err` on network failure, a non-2xx provider response
    /// (carrying the provider's status and body), or a malformed response.
    /// Never retries automatically.
    pub async fn exchange_code(&self, code: &str) -> Result<AccessToken> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::failed_precondition("client credentials not configured"));
        }

        let form = [
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .timeout(Self::EXCHANGE_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::unauthenticated(format!(
                "token exchange failed with {status}: {body}"
            )));
        }

        let body = response.text().await?;
        let token: TokenResponse = protocol::json(&body, "token exchange")?;

        AccessToken::new(token.access_token)
    }
}
