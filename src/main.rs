use std::process;

use clap::{command, Parser};
use log::{debug, error, info, LevelFilter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use spotidash::{
    auth::Authenticator,
    config::Config,
    error::{Error, Result},
    events::Event,
    gateway::Gateway,
    http, relay, remote,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OAuth client ID
    ///
    /// Issued by the provider's developer dashboard for this application.
    #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true, default_value_t)]
    client_id: String,

    /// OAuth client secret
    ///
    /// Keep this secret; anyone holding it can mint tokens for your
    /// application.
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true, default_value_t)]
    client_secret: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose`
                // is 0 by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Logs UI-boundary events; the headless stand-in for rendering.
fn handle_event(event: &Event) {
    match event {
        Event::TokenAcquired(_) => info!("login complete"),
        Event::LoggedOut => info!("please log in"),
        Event::NoActivePlayback => info!("no active playback"),
        Event::SnapshotChanged(snapshot) => {
            if let Some(ref track) = snapshot.track {
                info!(
                    "{} - {} [{}] volume {}%",
                    track.artist_names.join(", "),
                    track.name,
                    if snapshot.is_paused { "paused" } else { "playing" },
                    snapshot.volume_percent,
                );
            }
        }
    }
}

/// Main application loop: the relay server and the player sync client,
/// torn down together on Ctrl-C.
async fn run(args: Args) -> Result<()> {
    let config = Config::new(args.client_id, args.client_secret)?;
    let shutdown = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let gateway = Gateway::new(&config)?;
    let (client, controls) = remote::Client::new(gateway, event_tx.clone(), shutdown.clone());
    let sync = tokio::spawn(client.run());

    let http_client = http::Client::new(&config)?;
    let authenticator = Authenticator::new(&config, &http_client);
    let mut relay = tokio::spawn(relay::serve(
        config.bind_address,
        authenticator,
        config.ui_redirect.clone(),
        controls,
        event_tx,
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                shutdown.cancel();
                break;
            }

            result = &mut relay => {
                shutdown.cancel();
                result.map_err(|e| Error::internal(e.to_string()))??;
                return Err(Error::internal("relay server exited unexpectedly"));
            }

            Some(event) = event_rx.recv() => handle_event(&event),
        }
    }

    relay
        .await
        .map_err(|e| Error::internal(e.to_string()))??;
    sync.await.map_err(|e| Error::internal(e.to_string()))?;

    Ok(())
}

/// Main entry point of the application.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump the logging arguments before we do anything more; credentials
    // stay out of the logs.
    debug!("Command {{ quiet: {}, verbose: {} }}", args.quiet, args.verbose);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
