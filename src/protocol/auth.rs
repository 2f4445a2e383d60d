//! OAuth token endpoint response types.
//!
//! Covers the authorization-code grant response from
//! `https://accounts.spotify.com/api/token`:
//!
//! ```json
//! {
//!     "access_token": "secret_token",
//!     "token_type": "Bearer",
//!     "scope": "user-read-playback-state ...",
//!     "expires_in": 3600,
//!     "refresh_token": "secret_refresh"
//! }
//! ```
//!
//! # Note
//!
//! Token expiry is parsed but deliberately not tracked: this crate
//! implements no refresh flow (the relay's `/auth/token` endpoint is a
//! stub). The field is preserved for protocol completeness.

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Successful token exchange response.
///
/// Token material is redacted from Debug output.
#[serde_as]
#[derive(Clone, Eq, PartialEq, Deserialize, Redact)]
pub struct TokenResponse {
    /// OAuth bearer token for Web API authentication
    #[redact]
    pub access_token: String,

    /// Token type, `Bearer` for this grant
    pub token_type: String,

    /// Space-separated scopes actually granted
    #[serde(default)]
    pub scope: String,

    /// How long the token remains valid
    ///
    /// Parsed for completeness; expiry is not tracked (no refresh flow).
    #[serde_as(as = "Option<DurationSeconds<u64, Flexible>>")]
    #[serde(default)]
    pub expires_in: Option<Duration>,

    /// Refresh token, unused by this crate
    #[redact]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_response() {
        let body = r#"{
            "access_token": "abc123",
            "token_type": "Bearer",
            "scope": "user-read-playback-state",
            "expires_in": 3600,
            "refresh_token": "def456"
        }"#;

        let response: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.access_token, "abc123");
        assert_eq!(response.expires_in, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let body = r#"{"access_token": "abc123", "token_type": "Bearer"}"#;

        let response: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.access_token, "abc123");
        assert!(response.expires_in.is_none());
        assert!(response.refresh_token.is_none());
    }

    #[test]
    fn debug_redacts_token_material() {
        let body = r#"{"access_token": "abc123", "token_type": "Bearer"}"#;
        let response: TokenResponse = serde_json::from_str(body).unwrap();

        let debug = format!("{response:?}");
        assert!(!debug.contains("abc123"));
    }
}
