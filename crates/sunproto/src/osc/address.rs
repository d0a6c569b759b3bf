//! OSC address space of the DAW bridge.
//!
//! Outgoing addresses follow the `/live/<object>/<verb>/<property>` scheme.
//! Incoming traffic from the bridge arrives under [`RESPONSE_PREFIX`] (replies
//! correlated to a request) or [`LISTENER_PREFIX`] (property observers).

// Song
pub const SONG_GET_TEMPO: &str = "/live/song/get/tempo";
pub const SONG_SET_TEMPO: &str = "/live/song/set/tempo";
pub const SONG_GET_TIME: &str = "/live/song/get/current_song_time";
pub const SONG_START_PLAYING: &str = "/live/song/start_playing";
pub const SONG_STOP_PLAYING: &str = "/live/song/stop_playing";
pub const SONG_IS_PLAYING: &str = "/live/song/get/is_playing";

// Track
pub const TRACK_GET_VOLUME: &str = "/live/track/get/volume";
pub const TRACK_SET_VOLUME: &str = "/live/track/set/volume";
pub const TRACK_GET_PAN: &str = "/live/track/get/panning";
pub const TRACK_SET_PAN: &str = "/live/track/set/panning";
pub const TRACK_GET_MUTE: &str = "/live/track/get/mute";
pub const TRACK_SET_MUTE: &str = "/live/track/set/mute";
pub const TRACK_GET_NAME: &str = "/live/track/get/name";

// Clip slot
pub const CLIP_SLOT_CREATE: &str = "/live/clip_slot/create_clip";
pub const CLIP_SLOT_DELETE: &str = "/live/clip_slot/delete_clip";
pub const CLIP_SLOT_HAS_CLIP: &str = "/live/clip_slot/get/has_clip";

// Clip
pub const CLIP_FIRE: &str = "/live/clip/fire";
pub const CLIP_STOP: &str = "/live/clip/stop";
pub const CLIP_SET_NOTES: &str = "/live/clip/set/notes";
pub const CLIP_GET_NOTES: &str = "/live/clip/get/notes";
pub const CLIP_ADD_NOTES: &str = "/live/clip/add/notes";
pub const CLIP_REMOVE_NOTES: &str = "/live/clip/remove/notes";
pub const CLIP_GET_NAME: &str = "/live/clip/get/name";
pub const CLIP_SET_NAME: &str = "/live/clip/set/name";
pub const CLIP_GET_LENGTH: &str = "/live/clip/get/length";

// Device
pub const DEVICE_GET_NAME: &str = "/live/device/get/name";
pub const DEVICE_GET_PARAMS: &str = "/live/device/get/parameters/name";

pub const RESPONSE_PREFIX: &str = "/sunny/response/";
pub const LISTENER_PREFIX: &str = "/sunny/listen/";

pub const LISTEN_TEMPO: &str = "/sunny/listen/tempo";
pub const LISTEN_PLAYING: &str = "/sunny/listen/is_playing";
pub const LISTEN_TRACK_VOLUME: &str = "/sunny/listen/track/volume";
pub const LISTEN_CLIP_SLOT: &str = "/sunny/listen/clip_slot";

pub const STATUS: &str = "/sunny/status";
pub const ERROR: &str = "/sunny/error";

/// Strip [`RESPONSE_PREFIX`], returning the request address a reply belongs to.
///
/// `/sunny/response/live/song/get/tempo` -> `/live/song/get/tempo`
pub fn response_target(address: &str) -> Option<&str> {
    let rest = address.strip_prefix(RESPONSE_PREFIX)?;
    // keep the slash that terminated the prefix
    Some(&address[address.len() - rest.len() - 1..])
}

/// Strip [`LISTENER_PREFIX`], returning the observed property name.
pub fn listener_property(address: &str) -> Option<&str> {
    address
        .strip_prefix(LISTENER_PREFIX)
        .filter(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_target_keeps_leading_slash() {
        assert_eq!(
            response_target("/sunny/response/live/song/get/tempo"),
            Some("/live/song/get/tempo")
        );
        assert_eq!(response_target("/live/song/get/tempo"), None);
    }

    #[test]
    fn listener_property_names() {
        assert_eq!(listener_property(LISTEN_TRACK_VOLUME), Some("track/volume"));
        assert_eq!(listener_property(LISTENER_PREFIX), None);
        assert_eq!(listener_property(STATUS), None);
    }
}
