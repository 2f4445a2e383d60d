//! Playback snapshot model and the player capability seam.
//!
//! A [`PlaybackSnapshot`] is the authoritative remote state as of the last
//! successful probe. It is replaced wholesale on every applied probe; there
//! is no partial merge of remote fields, with one documented exception: the
//! provider does not always report a device, so an active state without a
//! device object retains the previously known device and volume.
//!
//! [`PlayerApi`] abstracts the polling transport so the REST prober could
//! be swapped for a streaming subscription without touching the sync core.

use std::future::Future;

use crate::{auth::AccessToken, error::Result, protocol::player as wire};

/// Metadata of the currently loaded track.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrackInfo {
    pub name: String,

    /// Ordered artist credits. At least one is expected, but malformed
    /// provider data may leave this empty.
    pub artist_names: Vec<String>,

    pub album_art_url: Option<String>,
}

impl From<&wire::Item> for TrackInfo {
    fn from(item: &wire::Item) -> Self {
        Self {
            name: item.name.clone(),
            artist_names: item.artists.iter().map(|a| a.name.clone()).collect(),
            album_art_url: item
                .album
                .images
                .iter()
                .find(|image| !image.url.is_empty())
                .map(|image| image.url.clone()),
        }
    }
}

/// The reported playback device.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

/// Remote playback state as of the last applied probe.
///
/// Invariant: when `is_active` is false, `track` and `device` are cleared
/// and must not be rendered as "now playing".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlaybackSnapshot {
    pub is_active: bool,
    pub is_paused: bool,
    pub track: Option<TrackInfo>,
    pub device: Option<DeviceInfo>,
    /// Device volume, 0..=100.
    pub volume_percent: u8,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            is_active: false,
            is_paused: true,
            track: None,
            device: None,
            volume_percent: 50,
        }
    }
}

impl PlaybackSnapshot {
    /// Applies an active wire state.
    ///
    /// The caller guarantees the state carries a playable item. Device and
    /// volume are updated only when the response reports a device.
    pub fn apply(&mut self, state: &wire::PlayerState) {
        self.is_active = true;
        self.is_paused = !state.is_playing;

        if let Some(ref item) = state.item {
            self.track = Some(TrackInfo::from(item));
        }

        if let Some(ref device) = state.device {
            self.device = Some(DeviceInfo {
                id: device.id.clone(),
                name: device.name.clone(),
            });
            if let Some(volume) = device.volume_percent {
                self.volume_percent = volume.min(100);
            }
        }
    }

    /// Clears the snapshot to the no-active-playback state.
    ///
    /// A normal state, not an error: 204, client/server error statuses and
    /// bodies without a playable item all land here.
    pub fn clear(&mut self) {
        self.is_active = false;
        self.is_paused = true;
        self.track = None;
        self.device = None;
    }
}

/// Result of one probe cycle.
#[derive(Clone, Debug)]
pub enum ProbeOutcome {
    /// 2xx with a playable item.
    Active(wire::PlayerState),

    /// No active playback: 204, status ≥ 400, or a body without an item.
    Inactive,

    /// Transport or parse failure; the previous snapshot is retained.
    Failed,
}

/// Capability to observe and control remote playback.
///
/// Implemented by [`crate::gateway::Gateway`] over the Web API; tests
/// substitute scripted implementations. Commands are best-effort: errors
/// are returned for logging, never as blocking failures.
pub trait PlayerApi: Clone + Send + Sync + 'static {
    /// Fetches the latest playback state.
    ///
    /// Infallible by design: failures normalize into
    /// [`ProbeOutcome::Inactive`] or [`ProbeOutcome::Failed`].
    fn probe(&self, token: &AccessToken) -> impl Future<Output = ProbeOutcome> + Send;

    /// Starts or resumes playback.
    fn play(&self, token: &AccessToken) -> impl Future<Output = Result<()>> + Send;

    /// Pauses playback.
    fn pause(&self, token: &AccessToken) -> impl Future<Output = Result<()>> + Send;

    /// Skips to the next track.
    fn next(&self, token: &AccessToken) -> impl Future<Output = Result<()>> + Send;

    /// Skips to the previous track.
    fn previous(&self, token: &AccessToken) -> impl Future<Output = Result<()>> + Send;

    /// Sets the device volume. `percent` is already clamped to 0..=100.
    fn set_volume(
        &self,
        token: &AccessToken,
        percent: u8,
    ) -> impl Future<Output = Result<()>> + Send;
}
