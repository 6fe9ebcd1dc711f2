//! Fixed-size DMX channel snapshot.
//!
//! [`ChannelSnapshot`] holds one level per control channel. A DMX
//! universe is 512 channels of 8-bit levels; every broadcast replaces the
//! snapshot wholesale, normalized to exactly that length.

use serde_json::Value;

/// Number of control channels in one universe.
pub const CHANNEL_COUNT: usize = 512;

/// An ordered set of exactly [`CHANNEL_COUNT`] channel levels.
///
/// Built from a raw broadcast payload via [`ChannelSnapshot::from_value`]
/// and replaced wholesale on every update; never merged incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    levels: [u8; CHANNEL_COUNT],
}

impl ChannelSnapshot {
    /// Normalizes a raw broadcast payload into a snapshot.
    ///
    /// Returns `None` when the payload is not an array. Shorter arrays
    /// pad the tail with 0, longer arrays are truncated. Entries that are
    /// not numeric normalize to 0; values above 255 clamp to 255.
    #[must_use]
    pub fn from_value(payload: &Value) -> Option<Self> {
        let entries = payload.as_array()?;
        let mut levels = [0u8; CHANNEL_COUNT];
        for (slot, entry) in levels.iter_mut().zip(entries) {
            *slot = entry
                .as_u64()
                .map_or(0, |level| u8::try_from(level).unwrap_or(u8::MAX));
        }
        Some(Self { levels })
    }

    /// Returns all channel levels in channel order.
    #[must_use]
    pub fn levels(&self) -> &[u8; CHANNEL_COUNT] {
        &self.levels
    }

    /// Returns the level of a single zero-based channel, or `None` when
    /// the index is out of range.
    #[must_use]
    pub fn level(&self, channel: usize) -> Option<u8> {
        self.levels.get(channel).copied()
    }

    /// Returns the number of channels with a non-zero level.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.levels.iter().filter(|level| **level > 0).count()
    }

    /// Returns the highest level in the snapshot.
    #[must_use]
    pub fn peak(&self) -> u8 {
        self.levels.iter().copied().max().unwrap_or(0)
    }
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            levels: [0; CHANNEL_COUNT],
        }
    }
}
