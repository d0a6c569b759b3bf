use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Slash-separated object path on the DAW side, e.g. `song/tracks/0/clip_slots/2`.
///
/// Segments are never empty: parsing drops empty pieces, so a leading,
/// trailing or doubled `/` is tolerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BridgePath {
    segments: Vec<String>,
}

impl BridgePath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Self {
        Self {
            segments: s
                .split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Append a named segment. Slashes in `name` produce several segments.
    pub fn child(&self, name: &str) -> Self {
        let mut path = self.clone();
        path.segments
            .extend(name.split('/').filter(|s| !s.is_empty()).map(str::to_owned));
        path
    }

    /// Append a numeric segment.
    pub fn index(&self, i: usize) -> Self {
        let mut path = self.clone();
        path.segments.push(i.to_string());
        path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for BridgePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(seg)?;
        }
        Ok(())
    }
}

impl FromStr for BridgePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for BridgePath {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for BridgePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<BridgePath> for String {
    fn from(path: BridgePath) -> Self {
        path.to_string()
    }
}

/// Well-known object paths.
pub mod paths {
    use super::BridgePath;

    pub fn song() -> BridgePath {
        BridgePath::parse("song")
    }

    pub fn track(index: usize) -> BridgePath {
        song().child("tracks").index(index)
    }

    pub fn clip_slot(track: usize, slot: usize) -> BridgePath {
        self::track(track).child("clip_slots").index(slot)
    }

    pub fn clip(track: usize, slot: usize) -> BridgePath {
        clip_slot(track, slot).child("clip")
    }
}
