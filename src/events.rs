//! Events emitted toward the dashboard UI boundary.
//!
//! The desktop shell this crate was extracted from receives the bearer
//! token and playback changes as native events; headless, the same
//! hand-off happens over a tokio mpsc channel carrying this enum. The
//! receiver renders; this crate never renders anything itself.

use crate::{auth::AccessToken, player::PlaybackSnapshot};

/// Events that can be emitted by the relay or the player sync core.
#[derive(Clone, Debug)]
pub enum Event {
    /// A login completed; emitted exactly once per successful exchange.
    TokenAcquired(AccessToken),

    /// The session logged out; render "please log in".
    LoggedOut,

    /// No active playback; render the idle state.
    ///
    /// A legitimate, common state distinct from failure.
    NoActivePlayback,

    /// The rendered snapshot changed.
    ///
    /// Carries the full reconciled state; the rendered volume may differ
    /// from the snapshot while a drag is open.
    SnapshotChanged(PlaybackSnapshot),
}
