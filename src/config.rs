//! Runtime configuration for the relay server and the player sync core.
//!
//! Credentials come from the `SPOTIFY_CLIENT_ID` and `SPOTIFY_CLIENT_SECRET`
//! environment variables unless set explicitly. Missing credentials are
//! logged at startup but do not abort: the relay stays up so the failure is
//! observable at the `/auth/login` endpoint instead of a silent exit.

use std::net::SocketAddr;

use url::Url;

use crate::error::{Error, Result};

/// Application configuration.
///
/// Owned by the process for its whole lifetime; handed by reference into
/// the relay and the remote client.
#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    /// OAuth client ID, empty when unconfigured.
    pub client_id: String,
    /// OAuth client secret, empty when unconfigured.
    pub client_secret: String,

    /// Redirect URI registered with the provider. Must match both the
    /// authorize redirect and the token exchange exactly.
    pub redirect_uri: Url,

    /// Where the relay sends the browser after a successful exchange,
    /// with `?token=<access_token>` appended.
    pub ui_redirect: Url,

    /// Address the relay server binds to.
    pub bind_address: SocketAddr,

    pub user_agent: String,
}

impl Config {
    /// Default redirect URI, matching the provider app registration.
    const REDIRECT_URI: &'static str = "http://127.0.0.1:5000/auth/callback";

    /// Default UI origin to hand the token to.
    const UI_REDIRECT: &'static str = "http://localhost:5173/";

    /// Default relay bind address.
    const BIND_ADDRESS: &'static str = "0.0.0.0:5000";

    /// Builds a configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Err` only if the built-in URLs or the application metadata
    /// are invalid; absent credentials are logged, not fatal.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default();
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default();

        Self::new(client_id, client_secret)
    }

    /// Builds a configuration with explicit credentials.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no valid `User-Agent` can be created out of the
    /// application metadata.
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        if client_id.is_empty() || client_secret.is_empty() {
            error!("SPOTIFY_CLIENT_ID or SPOTIFY_CLIENT_SECRET is missing");
        } else {
            info!("Spotify credentials loaded");
        }

        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            return Err(Error::invalid_argument(format!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            )));
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        // Serve a desktop-like `User-Agent` to the provider.
        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        Ok(Self {
            app_name,
            app_version,
            app_lang,

            client_id,
            client_secret,

            redirect_uri: Self::REDIRECT_URI.parse()?,
            ui_redirect: Self::UI_REDIRECT.parse()?,
            bind_address: Self::BIND_ADDRESS
                .parse()
                .map_err(|e| Error::invalid_argument(format!("bind address: {e}")))?,

            user_agent,
        })
    }

    /// Whether both OAuth client credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}
