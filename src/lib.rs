//! Headless Spotify playback relay and dashboard sync core.
//!
//! Two halves, wired together by the binary:
//!
//! * [`relay`] - a local HTTP server driving the OAuth2 authorization-code
//!   flow and handing the bearer token to the UI boundary
//! * [`remote`] - the player sync loop: polling
//!   [`gateway::Gateway`] for the current playback state, issuing
//!   best-effort control commands, and reconciling both in
//!   [`session::Session`] without flicker
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod player;
pub mod protocol;
pub mod relay;
pub mod remote;
pub mod session;
