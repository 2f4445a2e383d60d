//! Wire types for the Spotify endpoints this crate consumes.
//!
//! # Submodules
//!
//! * [`auth`] - OAuth token endpoint response types
//! * [`player`] - `/v1/me/player` playback state response types
//!
//! The shared [`json`] helper parses a response body with consistent
//! logging: parsed structures at TRACE, parse failures at ERROR with the
//! raw body preserved for protocol analysis.

pub mod auth;
pub mod player;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs a JSON response body.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of the endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
