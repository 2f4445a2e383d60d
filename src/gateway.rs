//! Spotify Web API client for playback observation and control.
//!
//! Wraps the rate-limited [`http::Client`] with the handful of player
//! endpoints this crate consumes:
//!
//! * `GET  /v1/me/player` - current playback state
//! * `PUT  /v1/me/player/play` / `PUT /v1/me/player/pause`
//! * `POST /v1/me/player/next` / `POST /v1/me/player/previous`
//! * `PUT  /v1/me/player/volume?volume_percent=N`
//!
//! All requests carry `Authorization: Bearer <token>`. Probe responses are
//! normalized here: 204 and error statuses are the ordinary "no active
//! playback" outcome, not failures.

use std::sync::Arc;

use reqwest::{
    header::{HeaderValue, AUTHORIZATION},
    Method, StatusCode, Url,
};

use crate::{
    auth::AccessToken,
    config::Config,
    error::Result,
    http,
    player::{PlayerApi, ProbeOutcome},
    protocol::{self, player::PlayerState},
};

/// Web API client. Cheap to clone; probes and commands issued from
/// concurrent tasks share one rate limiter.
#[derive(Clone)]
pub struct Gateway {
    http_client: Arc<http::Client>,
}

impl Gateway {
    /// Base URL of the player endpoints.
    const PLAYER_URL: &'static str = "https://api.spotify.com/v1/me/player";

    /// Creates a new gateway from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: Arc::new(http::Client::new(config)?),
        })
    }

    /// The player base URL as a `reqwest::Url`.
    ///
    /// # Panics
    ///
    /// Will panic if the built-in URL is invalid.
    fn player_url(path: &str) -> Url {
        let url = format!("{}{path}", Self::PLAYER_URL);
        url.parse().expect("invalid player endpoint")
    }

    /// Builds an authorized request against a player endpoint.
    fn player_request(
        &self,
        method: Method,
        path: &str,
        token: &AccessToken,
    ) -> Result<reqwest::Request> {
        let mut request = self.http_client.request(method, Self::player_url(path), "");
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        Ok(request)
    }

    /// Issues an authorized command call, failing on error statuses so the
    /// caller can log the delivery failure.
    async fn command(&self, method: Method, path: &str, token: &AccessToken) -> Result<()> {
        let request = self.player_request(method, path, token)?;
        let response = self.http_client.execute(request).await?;
        response.error_for_status()?;

        Ok(())
    }
}

impl PlayerApi for Gateway {
    async fn probe(&self, token: &AccessToken) -> ProbeOutcome {
        let request = match self.player_request(Method::GET, "", token) {
            Ok(request) => request,
            Err(e) => {
                warn!("probe request invalid: {e}");
                return ProbeOutcome::Failed;
            }
        };

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("probe transport error: {e}");
                return ProbeOutcome::Failed;
            }
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status.is_client_error() || status.is_server_error()
        {
            return ProbeOutcome::Inactive;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("probe read error: {e}");
                return ProbeOutcome::Failed;
            }
        };

        match protocol::json::<PlayerState>(&body, "player state") {
            Ok(state) if state.item.is_some() => ProbeOutcome::Active(state),
            Ok(_) => ProbeOutcome::Inactive,
            Err(_) => ProbeOutcome::Failed,
        }
    }

    async fn play(&self, token: &AccessToken) -> Result<()> {
        self.command(Method::PUT, "/play", token).await
    }

    async fn pause(&self, token: &AccessToken) -> Result<()> {
        self.command(Method::PUT, "/pause", token).await
    }

    async fn next(&self, token: &AccessToken) -> Result<()> {
        self.command(Method::POST, "/next", token).await
    }

    async fn previous(&self, token: &AccessToken) -> Result<()> {
        self.command(Method::POST, "/previous", token).await
    }

    async fn set_volume(&self, token: &AccessToken, percent: u8) -> Result<()> {
        self.command(
            Method::PUT,
            &format!("/volume?volume_percent={percent}"),
            token,
        )
        .await
    }
}
