//! Login session and playback state reconciliation.
//!
//! [`Session`] owns the only shared mutable state in the crate: the bearer
//! token and the latest playback snapshot. The tokio event loop serializes
//! every mutation point, so no locking is needed; the one discipline
//! required is issuance ordering of probe results.
//!
//! # State machine
//!
//! `LoggedOut → Polling{NoActive} ⇄ Polling{Active}`
//!
//! Transitions are driven solely by probe results. Commands never
//! transition the machine directly; they converge indirectly through the
//! follow-up probe.
//!
//! # Issuance ordering
//!
//! Every probe cycle takes a sequence number at issuance time. A result is
//! applied only if no younger cycle has applied before it: the latest
//! *issued* result wins, not the latest to complete. Failed cycles also
//! claim their sequence number, so a stale success from an older cycle
//! cannot overwrite the retained snapshot after a younger cycle has
//! already finished.

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    auth::AccessToken,
    events::Event,
    player::{PlaybackSnapshot, ProbeOutcome},
};

/// Rendering-significant session states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionState {
    /// No token; render "please log in".
    LoggedOut,

    /// Token present, no active playback; render the idle state.
    NoActive,

    /// Active playback; render full controls.
    Active,
}

/// The login session and reconciled player state.
pub struct Session {
    token: Option<AccessToken>,
    snapshot: PlaybackSnapshot,

    /// Next probe sequence number to hand out.
    next_seq: u64,
    /// Sequence numbers below this belong to a previous login.
    first_live_seq: u64,
    /// Youngest sequence number whose result has been applied.
    applied_seq: Option<u64>,

    /// Open volume drag; overrides the snapshot volume for rendering.
    volume_intent: Option<u8>,

    events: UnboundedSender<Event>,
}

impl Session {
    /// Creates a logged-out session emitting to `events`.
    #[must_use]
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            token: None,
            snapshot: PlaybackSnapshot::default(),
            next_seq: 0,
            first_live_seq: 0,
            applied_seq: None,
            volume_intent: None,
            events,
        }
    }

    /// Installs a bearer token, starting a fresh polling epoch.
    ///
    /// Results from cycles issued under a previous token are dead from
    /// this point on.
    pub fn set_token(&mut self, token: AccessToken) {
        self.token = Some(token);
        self.snapshot = PlaybackSnapshot::default();
        self.first_live_seq = self.next_seq;
        self.volume_intent = None;
    }

    /// Logs out: clears the token and all derived state.
    ///
    /// In-flight probe results are dead after this; the driver also stops
    /// its timers.
    pub fn clear_token(&mut self) {
        self.token = None;
        self.snapshot = PlaybackSnapshot::default();
        self.first_live_seq = self.next_seq;
        self.volume_intent = None;
        self.emit(Event::LoggedOut);
    }

    #[must_use]
    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.token.is_none() {
            SessionState::LoggedOut
        } else if self.snapshot.is_active {
            SessionState::Active
        } else {
            SessionState::NoActive
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> &PlaybackSnapshot {
        &self.snapshot
    }

    /// Whether the last known state is paused. Used for the play/pause
    /// toggle's read-then-act decision.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.snapshot.is_paused
    }

    /// Allocates a sequence number for a probe cycle, or `None` when the
    /// session is logged out (the prober is inert without a token).
    pub fn begin_probe(&mut self) -> Option<u64> {
        self.token.as_ref()?;
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(seq)
    }

    /// Applies a probe result in issuance order.
    ///
    /// Returns whether the result was applied. Stale results — from a
    /// previous login, or older than an already-applied cycle — are
    /// discarded. A [`ProbeOutcome::Failed`] claims its slot in the order
    /// but leaves the snapshot untouched.
    pub fn apply_probe(&mut self, seq: u64, outcome: &ProbeOutcome) -> bool {
        if self.token.is_none() || seq < self.first_live_seq {
            trace!("discarding probe result from a dead cycle (seq {seq})");
            return false;
        }
        if self.applied_seq.is_some_and(|applied| seq <= applied) {
            trace!("discarding superseded probe result (seq {seq})");
            return false;
        }

        self.applied_seq = Some(seq);

        let before_state = self.state();
        let before = self.snapshot.clone();
        match outcome {
            ProbeOutcome::Active(state) => self.snapshot.apply(state),
            ProbeOutcome::Inactive => self.snapshot.clear(),
            ProbeOutcome::Failed => return true,
        }

        if self.state() != before_state && self.state() == SessionState::NoActive {
            self.emit(Event::NoActivePlayback);
        }
        if self.snapshot != before {
            self.emit(Event::SnapshotChanged(self.rendered_snapshot()));
        }

        true
    }

    /// Opens (or moves) a volume drag. The rendered volume follows the
    /// drag, not the polled snapshot, until commit.
    pub fn drag_volume(&mut self, percent: u8) {
        self.volume_intent = Some(percent.min(100));
        self.emit(Event::SnapshotChanged(self.rendered_snapshot()));
    }

    /// Commits the open drag, returning the clamped value to send to the
    /// provider. The committed value is written to the snapshot so the
    /// slider holds until a fresh snapshot supersedes it.
    pub fn commit_volume(&mut self) -> Option<u8> {
        let percent = self.volume_intent.take()?;
        self.snapshot.volume_percent = percent;
        self.emit(Event::SnapshotChanged(self.rendered_snapshot()));

        Some(percent)
    }

    /// The volume to render: the open drag when present, the snapshot
    /// volume otherwise.
    #[must_use]
    pub fn rendered_volume(&self) -> u8 {
        self.volume_intent.unwrap_or(self.snapshot.volume_percent)
    }

    /// The snapshot as it should be rendered, with the drag overlay
    /// applied.
    #[must_use]
    pub fn rendered_snapshot(&self) -> PlaybackSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.volume_percent = self.rendered_volume();
        snapshot
    }

    fn emit(&self, event: Event) {
        // The receiver outlives the session in normal operation; a closed
        // channel only means the UI is gone during teardown.
        if self.events.send(event).is_err() {
            trace!("event channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::player as wire;
    use tokio::sync::mpsc;

    fn session() -> (Session, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(tx), rx)
    }

    fn logged_in() -> (Session, mpsc::UnboundedReceiver<Event>) {
        let (mut session, rx) = session();
        session.set_token(AccessToken::new("abc").unwrap());
        (session, rx)
    }

    fn active_outcome(name: &str, volume: u8) -> ProbeOutcome {
        ProbeOutcome::Active(wire::PlayerState {
            is_playing: true,
            item: Some(wire::Item {
                name: name.to_owned(),
                ..wire::Item::default()
            }),
            device: Some(wire::Device {
                id: "d1".to_owned(),
                name: "Laptop".to_owned(),
                volume_percent: Some(volume),
            }),
        })
    }

    #[test]
    fn logged_out_session_is_inert() {
        let (mut session, _rx) = session();
        assert_eq!(session.state(), SessionState::LoggedOut);
        assert!(session.begin_probe().is_none());
    }

    #[test]
    fn inactive_probe_reaches_no_active() {
        let (mut session, _rx) = logged_in();
        assert_eq!(session.state(), SessionState::NoActive);

        let seq = session.begin_probe().unwrap();
        assert!(session.apply_probe(seq, &ProbeOutcome::Inactive));
        assert_eq!(session.state(), SessionState::NoActive);
        assert!(session.snapshot().track.is_none());
    }

    #[test]
    fn active_probe_populates_controls() {
        let (mut session, _rx) = logged_in();
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 40));

        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.is_paused());
        assert_eq!(session.snapshot().volume_percent, 40);
        assert_eq!(session.snapshot().device.as_ref().unwrap().name, "Laptop");
    }

    #[test]
    fn error_status_clears_previous_track() {
        let (mut session, _rx) = logged_in();
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 40));

        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &ProbeOutcome::Inactive);

        assert_eq!(session.state(), SessionState::NoActive);
        assert!(session.snapshot().track.is_none());
        assert!(session.snapshot().device.is_none());
    }

    #[test]
    fn younger_result_wins_over_late_older_one() {
        let (mut session, _rx) = logged_in();
        let older = session.begin_probe().unwrap();
        let younger = session.begin_probe().unwrap();

        // The younger cycle completes first.
        assert!(session.apply_probe(younger, &active_outcome("Younger", 60)));
        // The older result arrives late and must be discarded.
        assert!(!session.apply_probe(older, &active_outcome("Older", 10)));

        assert_eq!(session.snapshot().track.as_ref().unwrap().name, "Younger");
        assert_eq!(session.snapshot().volume_percent, 60);
    }

    #[test]
    fn failed_cycle_claims_its_slot() {
        let (mut session, _rx) = logged_in();
        let older = session.begin_probe().unwrap();
        let younger = session.begin_probe().unwrap();

        // Younger tick fails; the retained snapshot must not be replaced
        // by the older tick's stale success afterwards.
        assert!(session.apply_probe(younger, &ProbeOutcome::Failed));
        assert!(!session.apply_probe(older, &active_outcome("Stale", 10)));
        assert_eq!(session.state(), SessionState::NoActive);
    }

    #[test]
    fn logout_kills_in_flight_results() {
        let (mut session, _rx) = logged_in();
        let seq = session.begin_probe().unwrap();
        session.clear_token();

        assert!(!session.apply_probe(seq, &active_outcome("Song", 40)));
        assert_eq!(session.state(), SessionState::LoggedOut);
    }

    #[test]
    fn relogin_kills_results_from_previous_session() {
        let (mut session, _rx) = logged_in();
        let stale = session.begin_probe().unwrap();

        session.clear_token();
        session.set_token(AccessToken::new("next").unwrap());

        assert!(!session.apply_probe(stale, &active_outcome("Old session", 10)));
        let fresh = session.begin_probe().unwrap();
        assert!(session.apply_probe(fresh, &active_outcome("New session", 20)));
    }

    #[test]
    fn open_drag_masks_polled_volume() {
        let (mut session, _rx) = logged_in();
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 40));

        session.drag_volume(80);
        assert_eq!(session.rendered_volume(), 80);

        // A snapshot arriving mid-drag must not snap the slider back.
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 40));
        assert_eq!(session.rendered_volume(), 80);
    }

    #[test]
    fn commit_holds_until_fresh_snapshot() {
        let (mut session, _rx) = logged_in();
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 40));

        session.drag_volume(80);
        assert_eq!(session.commit_volume(), Some(80));
        assert_eq!(session.rendered_volume(), 80);

        // The follow-up probe reflects the committed value remotely.
        let seq = session.begin_probe().unwrap();
        session.apply_probe(seq, &active_outcome("Song", 80));
        assert_eq!(session.rendered_volume(), 80);
    }

    #[test]
    fn commit_clamps_overlarge_values() {
        let (mut session, _rx) = logged_in();
        session.drag_volume(200);
        assert_eq!(session.commit_volume(), Some(100));
    }

    #[test]
    fn commit_without_drag_is_a_no_op() {
        let (mut session, _rx) = logged_in();
        assert_eq!(session.commit_volume(), None);
    }

    #[test]
    fn logout_emits_event() {
        let (mut session, mut rx) = logged_in();
        session.clear_token();

        let mut saw_logout = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::LoggedOut) {
                saw_logout = true;
            }
        }
        assert!(saw_logout);
    }
}
