//! The player sync driver: polling, command issuance and teardown.
//!
//! [`Client::run`] is the single event loop that owns the [`Session`].
//! It multiplexes:
//!
//! * the poll timer (1 s cadence while a token is present),
//! * results from probe tasks, applied in issuance order,
//! * control intents from the UI boundary, and
//! * the one pending follow-up probe a command schedules 200 ms out.
//!
//! Probe cycles are spawned as independent tasks and never awaited in the
//! loop; a cycle that outlives its usefulness is not aborted at the
//! transport level, its result is simply discarded on arrival. Consecutive
//! transport failures back the cadence off exponentially up to a cap and
//! reset on the first applied result.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::AccessToken,
    error::Result,
    events::Event,
    player::{PlayerApi, ProbeOutcome},
    session::Session,
};

/// User intents accepted by the sync core.
#[derive(Clone, Debug)]
pub enum ControlIntent {
    /// Install a freshly acquired bearer token and start polling.
    Login(AccessToken),

    /// Clear the token and stop polling.
    Logout,

    /// Toggle play/pause based on the last known state.
    ///
    /// Read-then-act: two rapid toggles before a re-probe can send the
    /// same verb twice and briefly desynchronize from the true remote
    /// state. The next probe converges it.
    TogglePlay,

    /// Skip to the next track.
    Next,

    /// Skip to the previous track.
    Previous,

    /// Set the device volume directly (no drag open).
    SetVolume(u8),

    /// Open or move a volume drag; display-only until committed.
    DragVolume(u8),

    /// Commit the open drag, sending the dragged value.
    CommitVolume,
}

/// Cheap handle for submitting [`ControlIntent`]s to a running client.
///
/// Sends are best-effort: once the client has shut down they are silently
/// dropped, matching the fire-and-forget control surface.
#[derive(Clone, Debug)]
pub struct Controls(mpsc::UnboundedSender<ControlIntent>);

impl Controls {
    pub fn login(&self, token: AccessToken) {
        self.send(ControlIntent::Login(token));
    }

    pub fn logout(&self) {
        self.send(ControlIntent::Logout);
    }

    pub fn toggle_play(&self) {
        self.send(ControlIntent::TogglePlay);
    }

    pub fn next(&self) {
        self.send(ControlIntent::Next);
    }

    pub fn previous(&self) {
        self.send(ControlIntent::Previous);
    }

    pub fn set_volume(&self, percent: u8) {
        self.send(ControlIntent::SetVolume(percent));
    }

    pub fn drag_volume(&self, percent: u8) {
        self.send(ControlIntent::DragVolume(percent));
    }

    pub fn commit_volume(&self) {
        self.send(ControlIntent::CommitVolume);
    }

    fn send(&self, intent: ControlIntent) {
        if self.0.send(intent).is_err() {
            trace!("control intent dropped, client is gone");
        }
    }
}

/// The player sync client.
pub struct Client<A: PlayerApi> {
    api: A,
    session: Session,
    intents: mpsc::UnboundedReceiver<ControlIntent>,
    probe_tx: mpsc::UnboundedSender<(u64, ProbeOutcome)>,
    probe_rx: mpsc::UnboundedReceiver<(u64, ProbeOutcome)>,
    shutdown: CancellationToken,
    consecutive_failures: u32,
}

impl<A: PlayerApi> Client<A> {
    /// Regular polling cadence.
    const POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Delay between issuing a command and its follow-up probe.
    const FOLLOW_UP_DELAY: Duration = Duration::from_millis(200);

    /// Upper bound on the backed-off cadence.
    const BACKOFF_CAP: Duration = Duration::from_secs(30);

    /// Creates a client and its control handle.
    ///
    /// `events` receives UI-boundary events; `shutdown` tears the loop and
    /// every pending timer down.
    #[must_use]
    pub fn new(
        api: A,
        events: mpsc::UnboundedSender<Event>,
        shutdown: CancellationToken,
    ) -> (Self, Controls) {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (probe_tx, probe_rx) = mpsc::unbounded_channel();

        let client = Self {
            api,
            session: Session::new(events),
            intents: intent_rx,
            probe_tx,
            probe_rx,
            shutdown,
            consecutive_failures: 0,
        };

        (client, Controls(intent_tx))
    }

    /// Runs the sync loop until shutdown.
    pub async fn run(self) {
        let Self {
            api,
            mut session,
            mut intents,
            probe_tx,
            mut probe_rx,
            shutdown,
            mut consecutive_failures,
        } = self;

        let poll = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(poll);
        let mut poll_armed = false;

        let follow_up = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(follow_up);
        let mut follow_up_armed = false;

        loop {
            tokio::select! {
                // Prioritize teardown over pending work.
                biased;

                () = shutdown.cancelled() => {
                    debug!("player sync shutting down");
                    break;
                }

                Some(intent) = intents.recv() => {
                    match intent {
                        ControlIntent::Login(token) => {
                            info!("token installed, starting playback sync");
                            session.set_token(token);
                            consecutive_failures = 0;

                            // Probe immediately; the cadence starts one
                            // interval later.
                            Self::spawn_probe(&mut session, &api, &probe_tx);
                            poll.as_mut().reset(tokio::time::Instant::now() + Self::POLL_INTERVAL);
                            poll_armed = true;
                        }
                        ControlIntent::Logout => {
                            info!("logged out, stopping playback sync");
                            session.clear_token();
                            poll_armed = false;
                            follow_up_armed = false;
                        }
                        intent => {
                            if Self::issue(&mut session, &api, &intent) {
                                follow_up.as_mut().reset(
                                    tokio::time::Instant::now() + Self::FOLLOW_UP_DELAY,
                                );
                                follow_up_armed = true;
                            }
                        }
                    }
                }

                Some((seq, outcome)) = probe_rx.recv() => {
                    if session.apply_probe(seq, &outcome) {
                        let failures_before = consecutive_failures;
                        if matches!(outcome, ProbeOutcome::Failed) {
                            consecutive_failures += 1;
                        } else {
                            consecutive_failures = 0;
                        }

                        // Steady-state results leave the cadence alone; the
                        // timer is re-armed only when the backoff spacing
                        // changed, so a follow-up result cannot defer the
                        // next regular tick.
                        if poll_armed && consecutive_failures != failures_before {
                            poll.as_mut().reset(
                                tokio::time::Instant::now()
                                    + Self::poll_delay(consecutive_failures),
                            );
                        }
                    }
                }

                () = &mut poll, if poll_armed => {
                    Self::spawn_probe(&mut session, &api, &probe_tx);
                    // Keep the cadence even when a cycle is slow; the
                    // result handler re-arms with backoff applied.
                    poll.as_mut().reset(
                        tokio::time::Instant::now() + Self::poll_delay(consecutive_failures),
                    );
                }

                () = &mut follow_up, if follow_up_armed => {
                    follow_up_armed = false;
                    Self::spawn_probe(&mut session, &api, &probe_tx);
                }
            }
        }
    }

    /// Cadence for the next tick, backed off after consecutive transport
    /// failures.
    fn poll_delay(consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Self::POLL_INTERVAL;
        }

        let exponent = consecutive_failures.min(5);
        (Self::POLL_INTERVAL * 2u32.pow(exponent)).min(Self::BACKOFF_CAP)
    }

    /// Starts a probe cycle as an independent task.
    ///
    /// Inert without a token. The cycle's result is funneled back into the
    /// loop tagged with its issuance sequence number.
    fn spawn_probe(
        session: &mut Session,
        api: &A,
        probe_tx: &mpsc::UnboundedSender<(u64, ProbeOutcome)>,
    ) {
        let Some(seq) = session.begin_probe() else {
            return;
        };
        let Some(token) = session.token().cloned() else {
            return;
        };

        let api = api.clone();
        let tx = probe_tx.clone();
        tokio::spawn(async move {
            let outcome = api.probe(&token).await;
            // Receiver gone means the loop has shut down; nothing to do.
            let _ = tx.send((seq, outcome));
        });
    }

    /// Issues a playback command fire-and-forget.
    ///
    /// Returns whether a provider call was made (and a follow-up probe
    /// should be scheduled). No-ops without a token; delivery failures are
    /// logged, never surfaced.
    fn issue(session: &mut Session, api: &A, intent: &ControlIntent) -> bool {
        // Drags never hit the provider, with or without a token.
        if let ControlIntent::DragVolume(percent) = intent {
            session.drag_volume(*percent);
            return false;
        }

        let Some(token) = session.token().cloned() else {
            return false;
        };

        let api = api.clone();
        match intent {
            ControlIntent::TogglePlay => {
                if session.is_paused() {
                    Self::fire("play", async move { api.play(&token).await });
                } else {
                    Self::fire("pause", async move { api.pause(&token).await });
                }
            }
            ControlIntent::Next => {
                Self::fire("next", async move { api.next(&token).await });
            }
            ControlIntent::Previous => {
                Self::fire("previous", async move { api.previous(&token).await });
            }
            ControlIntent::SetVolume(percent) => {
                let percent = (*percent).min(100);
                Self::fire("volume", async move { api.set_volume(&token, percent).await });
            }
            ControlIntent::CommitVolume => {
                let Some(percent) = session.commit_volume() else {
                    return false;
                };
                Self::fire("volume", async move { api.set_volume(&token, percent).await });
            }
            // Login, Logout and DragVolume are handled before this point.
            _ => return false,
        }

        true
    }

    /// Spawns a command call, logging delivery failures.
    fn fire<F>(name: &'static str, call: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = call.await {
                warn!("{name} command failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::player as wire;
    use std::sync::{Arc, Mutex};

    /// Scripted player API recording every call it receives.
    #[derive(Clone)]
    struct FakeApi {
        calls: Arc<Mutex<Vec<String>>>,
        /// Wire state returned by probes; `None` scripts "no content".
        state: Arc<Mutex<Option<wire::PlayerState>>>,
        /// Scripts transport failure on probes while set.
        fail_probes: Arc<Mutex<bool>>,
        fail_commands: bool,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                state: Arc::new(Mutex::new(None)),
                fail_probes: Arc::new(Mutex::new(false)),
                fail_commands: false,
            }
        }

        fn set_probe_failure(&self, fail: bool) {
            *self.fail_probes.lock().unwrap() = fail;
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|c| c == &name).count()
        }

        fn record(&self, name: &str) {
            self.calls.lock().unwrap().push(name.to_owned());
        }

        fn script_playing(&self) {
            *self.state.lock().unwrap() = Some(wire::PlayerState {
                is_playing: true,
                item: Some(wire::Item {
                    name: "Song".to_owned(),
                    ..wire::Item::default()
                }),
                device: None,
            });
        }

        fn command_result(&self) -> Result<()> {
            if self.fail_commands {
                Err(Error::unavailable("scripted failure"))
            } else {
                Ok(())
            }
        }
    }

    impl PlayerApi for FakeApi {
        async fn probe(&self, _token: &AccessToken) -> ProbeOutcome {
            self.record("probe");
            if *self.fail_probes.lock().unwrap() {
                return ProbeOutcome::Failed;
            }
            match self.state.lock().unwrap().clone() {
                Some(state) => ProbeOutcome::Active(state),
                None => ProbeOutcome::Inactive,
            }
        }

        async fn play(&self, _token: &AccessToken) -> Result<()> {
            self.record("play");
            self.command_result()
        }

        async fn pause(&self, _token: &AccessToken) -> Result<()> {
            self.record("pause");
            self.command_result()
        }

        async fn next(&self, _token: &AccessToken) -> Result<()> {
            self.record("next");
            self.command_result()
        }

        async fn previous(&self, _token: &AccessToken) -> Result<()> {
            self.record("previous");
            self.command_result()
        }

        async fn set_volume(&self, _token: &AccessToken, percent: u8) -> Result<()> {
            self.record(&format!("volume:{percent}"));
            self.command_result()
        }
    }

    struct Harness {
        api: FakeApi,
        controls: Controls,
        events: mpsc::UnboundedReceiver<Event>,
        shutdown: CancellationToken,
    }

    fn start(api: FakeApi) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (client, controls) = Client::new(api.clone(), event_tx, shutdown.clone());
        tokio::spawn(client.run());

        Harness {
            api,
            controls,
            events,
            shutdown,
        }
    }

    async fn settle() {
        // Let spawned tasks and channel deliveries run under paused time.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    fn token() -> AccessToken {
        AccessToken::new("abc").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn no_token_means_no_network_calls() {
        let h = start(FakeApi::new());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.api.calls().is_empty());
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn login_probes_immediately_then_on_cadence() {
        let h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;
        assert_eq!(h.api.count("probe"), 1);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(h.api.count("probe"), 3);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_when_paused_issues_play_and_one_follow_up() {
        let h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;
        let probes_before = h.api.count("probe");

        h.controls.toggle_play();
        settle().await;
        assert_eq!(h.api.count("play"), 1);
        assert_eq!(h.api.count("pause"), 0);

        // Not yet: the follow-up fires 200 ms after the command.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.api.count("probe"), probes_before);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.api.count("probe"), probes_before + 1);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_when_playing_issues_pause() {
        let api = FakeApi::new();
        api.script_playing();
        let h = start(api);

        h.controls.login(token());
        settle().await;

        h.controls.toggle_play();
        settle().await;
        assert_eq!(h.api.count("pause"), 1);
        assert_eq!(h.api.count("play"), 0);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn set_volume_clamps_before_sending() {
        let h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;

        h.controls.set_volume(200);
        settle().await;
        assert_eq!(h.api.count("volume:100"), 1);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn drag_commit_sends_dragged_value() {
        let h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;

        h.controls.drag_volume(80);
        settle().await;
        // An open drag alone never hits the provider.
        assert_eq!(h.api.count("volume:80"), 0);

        h.controls.commit_volume();
        settle().await;
        assert_eq!(h.api.count("volume:80"), 1);
        h.shutdown.cancel();
    }

    #[test]
    fn poll_backoff_doubles_and_is_capped() {
        assert_eq!(
            Client::<FakeApi>::poll_delay(0),
            Duration::from_millis(1000)
        );
        assert_eq!(
            Client::<FakeApi>::poll_delay(1),
            Duration::from_millis(2000)
        );
        assert_eq!(Client::<FakeApi>::poll_delay(5), Duration::from_secs(30));
        assert_eq!(Client::<FakeApi>::poll_delay(50), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failures_widen_the_cadence_until_success() {
        let h = start(FakeApi::new());
        h.api.set_probe_failure(true);
        h.controls.login(token());
        settle().await;
        assert_eq!(h.api.count("probe"), 1);

        // One failure doubles the spacing: no tick at the regular interval.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.api.count("probe"), 1);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.api.count("probe"), 2);

        // Two failures quadruple it; the third tick lands 4 s after the
        // second.
        h.api.set_probe_failure(false);
        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(h.api.count("probe"), 3);

        // The applied success resets the cadence to the regular interval.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.api.count("probe"), 4);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_result_does_not_defer_the_cadence() {
        let h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;

        h.controls.toggle_play();
        tokio::time::sleep(Duration::from_millis(300)).await;
        // Initial probe plus the command's follow-up.
        assert_eq!(h.api.count("probe"), 2);

        // The regular tick still lands one interval after login.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(h.api.count("probe"), 3);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_all_timers() {
        let mut h = start(FakeApi::new());
        h.controls.login(token());
        settle().await;

        // Leave a follow-up pending, then log out before it fires.
        h.controls.toggle_play();
        h.controls.logout();
        settle().await;
        while h.events.try_recv().is_ok() {}
        let calls_before = h.api.calls().len();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.api.calls().len(), calls_before);
        assert!(h.events.try_recv().is_err());
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn command_failure_is_contained() {
        let mut api = FakeApi::new();
        api.fail_commands = true;
        let h = start(api);

        h.controls.login(token());
        settle().await;

        h.controls.next();
        settle().await;
        assert_eq!(h.api.count("next"), 1);

        // Polling continues unaffected by the failed delivery.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.api.count("probe") >= 2);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn commands_without_token_are_no_ops() {
        let h = start(FakeApi::new());

        h.controls.toggle_play();
        h.controls.next();
        h.controls.set_volume(50);
        settle().await;
        assert!(h.api.calls().is_empty());
        h.shutdown.cancel();
    }
}
