//! Local OAuth relay server.
//!
//! Three routes, mirroring the dashboard's original relay:
//!
//! * `GET /auth/login` - 302 to the provider's authorize endpoint
//! * `GET /auth/callback` - code-for-token exchange, then 302 back to the
//!   dashboard UI with `?token=<access_token>`; 500 with a plain-text body
//!   on failure
//! * `GET /auth/token` - refresh stub, always `{"access_token": ""}`
//!
//! On a successful exchange the token is additionally handed to the
//! in-process UI boundary (control handle and event channel) exactly once,
//! the headless equivalent of the desktop shell's native event emission.

use std::{collections::HashMap, convert::Infallible, net::SocketAddr};

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use warp::{
    http::{StatusCode, Uri},
    Filter, Rejection, Reply,
};

use url::Url;

use crate::{
    auth::Authenticator,
    error::{Error, Result},
    events::Event,
    remote::Controls,
};

/// Injects a cloneable value into a filter chain.
fn with<T>(value: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone
where
    T: Clone + Send,
{
    warp::any().map(move || value.clone())
}

/// Builds the relay's route tree.
pub fn routes(
    authenticator: Authenticator,
    ui_redirect: Url,
    controls: Controls,
    events: UnboundedSender<Event>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let login = {
        let authenticator = authenticator.clone();
        warp::path!("auth" / "login").and(warp::get()).map(move || {
            let state = Authenticator::login_state();
            let url = authenticator.authorize_url(&state);
            let uri: Uri = url
                .as_str()
                .parse()
                .expect("authorize url is not a valid uri");
            warp::redirect::found(uri)
        })
    };

    let callback = warp::path!("auth" / "callback")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with(authenticator))
        .and(with(ui_redirect))
        .and(with(controls))
        .and(with(events))
        .and_then(handle_callback);

    let token_stub = warp::path!("auth" / "token").and(warp::get()).map(|| {
        // Refresh was never implemented; the dashboard treats an empty
        // token as logged out.
        warp::reply::json(&serde_json::json!({ "access_token": "" }))
    });

    login
        .or(callback)
        .or(token_stub)
        .with(warp::log("spotidash::relay"))
}

/// Handles the provider redirect: exchanges the code and hands the token
/// over.
///
/// The `state` parameter from the authorize redirect is not validated
/// here, in parity with the relay this replaces. That is a latent CSRF
/// gap.
async fn handle_callback(
    query: HashMap<String, String>,
    authenticator: Authenticator,
    ui_redirect: Url,
    controls: Controls,
    events: UnboundedSender<Event>,
) -> std::result::Result<warp::reply::Response, Infallible> {
    let Some(code) = query.get("code") else {
        warn!("callback without an authorization code");
        return Ok(error_page("Missing authorization code."));
    };

    debug!("received callback, exchanging code for token");
    match authenticator.exchange_code(code).await {
        Ok(token) => {
            info!("token obtained, handing off to the dashboard");

            // Hand the token to the UI boundary once per successful
            // exchange.
            controls.login(token.clone());
            if events.send(Event::TokenAcquired(token.clone())).is_err() {
                trace!("event channel closed");
            }

            let mut target = ui_redirect;
            target
                .query_pairs_mut()
                .append_pair("token", token.as_str());

            match target.as_str().parse::<Uri>() {
                Ok(uri) => Ok(warp::redirect::found(uri).into_response()),
                Err(e) => {
                    error!("ui redirect invalid: {e}");
                    Ok(error_page("Error getting token. Check server logs for details."))
                }
            }
        }
        Err(e) => {
            error!("error getting token: {e}");
            Ok(error_page("Error getting token. Check server logs for details."))
        }
    }
}

fn error_page(message: &'static str) -> warp::reply::Response {
    warp::reply::with_status(message, StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

/// Serves the relay until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns `Err` if the bind address is unavailable.
pub async fn serve(
    bind_address: SocketAddr,
    authenticator: Authenticator,
    ui_redirect: Url,
    controls: Controls,
    events: UnboundedSender<Event>,
    shutdown: CancellationToken,
) -> Result<()> {
    let routes = routes(authenticator, ui_redirect, controls, events);

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(bind_address, async move {
            shutdown.cancelled().await;
        })
        .map_err(Error::unavailable)?;

    info!("relay listening on http://{addr}");
    server.await;

    Ok(())
}
