//! Playback state response types for `GET /v1/me/player`.
//!
//! The endpoint is eventually consistent and sparse: a 204 carries no body
//! at all, a 2xx body may lack the `item` (nothing playable) and may lack
//! the `device` object (the provider does not always report one). All
//! fields are therefore lenient, with defaults for anything the provider
//! is known to omit.

use serde::Deserialize;

/// Full playback state as returned by the player endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlayerState {
    /// Whether playback is currently running.
    #[serde(default)]
    pub is_playing: bool,

    /// The playable item, absent when nothing is loaded.
    pub item: Option<Item>,

    /// The active device, not always reported.
    pub device: Option<Device>,
}

/// A playable item (track or episode).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub name: String,

    /// Ordered artist credits; may be empty on malformed data.
    #[serde(default)]
    pub artists: Vec<Artist>,

    #[serde(default)]
    pub album: Album,
}

/// An artist credit on an item.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

/// Album metadata; only the artwork is consumed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Album {
    /// Artwork renditions, largest first per the provider's convention.
    #[serde(default)]
    pub images: Vec<Image>,
}

/// One artwork rendition.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub url: String,
}

/// The reported playback device.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Volume in percent; some device types do not report it.
    pub volume_percent: Option<u8>,
}
