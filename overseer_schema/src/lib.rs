//! Persisted data contracts for the overseer.
//!
//! Everything in here survives a host restart: the suspension ledger, the
//! shared spawn group caches and per-room safety tracking. The runtime in
//! `overseer_core` wraps these records with behaviour; this crate only knows
//! how they look on disk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete simulation step.
pub type Tick = u64;

pub const MEMORY_VERSION: u32 = 1;

/// Task reference -> tick at which the task resumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SuspensionRecords {
    pub entries: BTreeMap<String, Tick>,
}

impl SuspensionRecords {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cached producer eligibility for one spawn group anchor room.
///
/// `distances` and `routes` are keyed by colony name and only ever contain
/// colonies that also appear in `colonies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpawnGroupRecord {
    pub colonies: Vec<String>,
    pub distances: BTreeMap<String, u32>,
    pub routes: BTreeMap<String, BTreeMap<String, bool>>,
    pub expiration: Tick,
}

impl SpawnGroupRecord {
    pub fn is_expired(&self, tick: Tick) -> bool {
        tick >= self.expiration
    }

    pub fn distance(&self, colony: &str) -> Option<u32> {
        self.distances.get(colony).copied()
    }

    pub fn average_distance(&self) -> Option<f32> {
        if self.distances.is_empty() {
            return None;
        }
        let total: u64 = self.distances.values().map(|d| u64::from(*d)).sum();
        Some(total as f32 / self.distances.len() as f32)
    }

    /// True when every distance and route key names an eligible colony.
    pub fn is_consistent(&self) -> bool {
        let known = |name: &String| self.colonies.iter().any(|colony| colony == name);
        self.distances.keys().all(known) && self.routes.keys().all(known)
    }
}

/// Continuous safe/unsafe periods observed for a room.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoomSafetyRecord {
    pub unsafe_since: Option<Tick>,
    pub safe_since: Option<Tick>,
    pub last_observed: Tick,
}

impl RoomSafetyRecord {
    pub fn unsafe_for(&self, tick: Tick) -> u64 {
        self.unsafe_since
            .map(|since| tick.saturating_sub(since))
            .unwrap_or(0)
    }

    pub fn safe_for(&self, tick: Tick) -> u64 {
        self.safe_since
            .map(|since| tick.saturating_sub(since))
            .unwrap_or(0)
    }
}

/// Everything the overseer persists between host restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryImage {
    pub version: u32,
    #[serde(default)]
    pub suspend_until: SuspensionRecords,
    #[serde(default)]
    pub spawn_groups: BTreeMap<String, SpawnGroupRecord>,
    #[serde(default)]
    pub safety: BTreeMap<String, RoomSafetyRecord>,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self {
            version: MEMORY_VERSION,
            suspend_until: SuspensionRecords::default(),
            spawn_groups: BTreeMap::new(),
            safety: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to parse memory image: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode binary memory image: {0}")]
    Binary(#[from] bincode::Error),
    #[error("memory image version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl MemoryImage {
    pub fn to_json(&self) -> Result<String, MemoryError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, MemoryError> {
        let image: MemoryImage = serde_json::from_str(json)?;
        image.check_version()
    }

    pub fn encode_binary(&self) -> Result<Vec<u8>, MemoryError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode_binary(bytes: &[u8]) -> Result<Self, MemoryError> {
        let image: MemoryImage = bincode::deserialize(bytes)?;
        image.check_version()
    }

    fn check_version(self) -> Result<Self, MemoryError> {
        if self.version > MEMORY_VERSION {
            return Err(MemoryError::UnsupportedVersion {
                found: self.version,
                supported: MEMORY_VERSION,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_group_record_detects_stray_distance_keys() {
        let mut record = SpawnGroupRecord {
            colonies: vec!["W1N1".to_string()],
            ..Default::default()
        };
        record.distances.insert("W1N1".to_string(), 40);
        assert!(record.is_consistent());

        record.distances.insert("W5N5".to_string(), 80);
        assert!(!record.is_consistent());
    }

    #[test]
    fn expiration_is_inclusive() {
        let record = SpawnGroupRecord {
            expiration: 500,
            ..Default::default()
        };
        assert!(!record.is_expired(499));
        assert!(record.is_expired(500));
        assert!(record.is_expired(501));
    }

    #[test]
    fn average_distance_ignores_empty_tables() {
        let mut record = SpawnGroupRecord::default();
        assert_eq!(record.average_distance(), None);
        record.distances.insert("W1N1".to_string(), 30);
        record.distances.insert("W2N1".to_string(), 50);
        assert_eq!(record.average_distance(), Some(40.0));
    }

    #[test]
    fn sparse_memory_document_fills_defaults() {
        let image = MemoryImage::from_json(r#"{"version":1,"suspend_until":{"miner:W1N1":120}}"#)
            .expect("sparse image parses");
        assert_eq!(image.suspend_until.entries.get("miner:W1N1"), Some(&120));
        assert!(image.spawn_groups.is_empty());
        assert!(image.safety.is_empty());
    }

    #[test]
    fn newer_memory_version_is_rejected() {
        let err = MemoryImage::from_json(r#"{"version":99}"#).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::UnsupportedVersion { found: 99, .. }
        ));
    }

    fn populated_image() -> MemoryImage {
        let mut image = MemoryImage::default();
        image
            .suspend_until
            .entries
            .insert("guard:W2N1:25:25/guard".to_string(), 640);
        let mut record = SpawnGroupRecord {
            colonies: vec!["W1N1".to_string()],
            expiration: 2_250,
            ..Default::default()
        };
        record.distances.insert("W1N1".to_string(), 95);
        record.routes.insert(
            "W1N1".to_string(),
            BTreeMap::from([("W1N1".to_string(), true), ("W2N1".to_string(), true)]),
        );
        image.spawn_groups.insert("W2N1".to_string(), record);
        image.safety.insert(
            "W2N1".to_string(),
            RoomSafetyRecord {
                unsafe_since: None,
                safe_since: Some(12),
                last_observed: 600,
            },
        );
        image
    }

    #[test]
    fn binary_image_restores_every_table() {
        let image = populated_image();
        let bytes = image.encode_binary().expect("encodes");
        let restored = MemoryImage::decode_binary(&bytes).expect("decodes");
        assert_eq!(restored, image);
        assert_eq!(restored.spawn_groups["W2N1"].distance("W1N1"), Some(95));
    }

    #[test]
    fn newer_binary_version_is_rejected() {
        let image = MemoryImage {
            version: MEMORY_VERSION + 1,
            ..populated_image()
        };
        let bytes = image.encode_binary().expect("encodes");
        let err = MemoryImage::decode_binary(&bytes).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::UnsupportedVersion { found, supported }
                if found == MEMORY_VERSION + 1 && supported == MEMORY_VERSION
        ));
    }

    #[test]
    fn truncated_binary_image_is_a_decode_error() {
        let bytes = populated_image().encode_binary().expect("encodes");
        let err = MemoryImage::decode_binary(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, MemoryError::Binary(_)));
        assert!(err.to_string().starts_with("failed to decode binary memory image"));
    }

    #[test]
    fn safety_durations_saturate() {
        let record = RoomSafetyRecord {
            unsafe_since: Some(100),
            safe_since: None,
            last_observed: 130,
        };
        assert_eq!(record.unsafe_for(130), 30);
        assert_eq!(record.unsafe_for(90), 0);
        assert_eq!(record.safe_for(130), 0);
    }
}
