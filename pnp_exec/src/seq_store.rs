//! # Sequence Store
//!
//! Read-only table of recorded arm sequences, keyed by [`PositionKey`]. The table is loaded once
//! at startup and then shared behind an `Arc` by everything which needs to look up a sequence.
//!
//! Two persisted layouts are accepted:
//!
//! ```json
//! [{"key": 0, "positions": [[0.0, 90.0, 90.0, 90.0, 90.0, 0.0]]}]
//! ```
//!
//! and the older recorder layout keyed by the stringified position key:
//!
//! ```json
//! {"0": [[0.0, 90.0, 90.0, 90.0, 90.0, 0.0]]}
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
    path::{Path, PathBuf},
};

use comms_if::eqpt::arm::PositionKey;
use log::debug;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Joint targets for every axis of the arm.
pub type Waypoint = Vec<f64>;

/// Ordered list of waypoints making up a recorded motion.
pub type Sequence = Vec<Waypoint>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Mapping from position keys to recorded sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTable {
    num_joints: usize,
    sequences: BTreeMap<PositionKey, Sequence>,
}

/// A single entry of the list layout.
#[derive(Debug, Deserialize)]
struct SequenceRecord {
    key: PositionKey,
    positions: Sequence,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Configuration problems which prevent the executable from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read the sequence file {0:?}: {1}")]
    FileLoad(PathBuf, std::io::Error),

    #[error("The sequence file is malformed: {0}")]
    MalformedSequenceFile(String),

    #[error(
        "Waypoint {index} of sequence {key} has {found} joints but the arm has {expected} joints"
    )]
    InconsistentWaypointLength {
        key: PositionKey,
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Position key {0} appears more than once in the sequence file")]
    DuplicateKey(PositionKey),

    #[error("The {role} position key {key} has no recorded sequence")]
    MissingPositionKey { role: &'static str, key: PositionKey },

    #[error("Invalid checkpoint set: {0}")]
    InvalidCheckpointSet(String),

    #[error("Invalid parameter {0}: {1}")]
    InvalidParameter(&'static str, String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SequenceFile {
    Records(Vec<SequenceRecord>),
    Keyed(KeyedSequences),
}

/// Entries of the keyed layout in file order, repeated keys included.
#[derive(Debug)]
struct KeyedSequences(Vec<(String, Sequence)>);

struct KeyedSequencesVisitor;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'de> Deserialize<'de> for KeyedSequences {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(KeyedSequencesVisitor)
    }
}

impl<'de> Visitor<'de> for KeyedSequencesVisitor {
    type Value = KeyedSequences;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a map of position keys to sequences")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, Sequence>()? {
            entries.push(entry);
        }
        Ok(KeyedSequences(entries))
    }
}

impl SequenceTable {
    /// Load the table from a JSON file, checking every waypoint has `num_joints` entries.
    pub fn load<P: AsRef<Path>>(path: P, num_joints: usize) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let file_str = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileLoad(path.to_path_buf(), e))?;

        let table = Self::from_json(&file_str, num_joints)?;

        debug!(
            "Loaded {} sequences from {:?}: keys {:?}",
            table.len(),
            path,
            table.keys().collect::<Vec<_>>()
        );

        Ok(table)
    }

    /// Parse the table from a JSON string in either of the accepted layouts.
    pub fn from_json(json: &str, num_joints: usize) -> Result<Self, ConfigError> {
        let file: SequenceFile = serde_json::from_str(json)
            .map_err(|e| ConfigError::MalformedSequenceFile(e.to_string()))?;

        let records = match file {
            SequenceFile::Records(r) => r
                .into_iter()
                .map(|r| (r.key, r.positions))
                .collect::<Vec<_>>(),
            SequenceFile::Keyed(KeyedSequences(entries)) => {
                let mut records = Vec::with_capacity(entries.len());
                for (key, positions) in entries {
                    let key = key.trim().parse::<PositionKey>().map_err(|_| {
                        ConfigError::MalformedSequenceFile(format!(
                            "\"{}\" is not a valid position key",
                            key
                        ))
                    })?;
                    // Catches both a repeated key and spellings of the same key, like "2" and "02"
                    if records.iter().any(|(k, _)| *k == key) {
                        return Err(ConfigError::DuplicateKey(key));
                    }
                    records.push((key, positions));
                }
                records
            }
        };

        Self::from_records(records, num_joints)
    }

    /// Build the table from `(key, sequence)` pairs.
    pub fn from_records<I>(records: I, num_joints: usize) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (PositionKey, Sequence)>,
    {
        let mut sequences = BTreeMap::new();

        for (key, sequence) in records {
            if sequence.is_empty() {
                return Err(ConfigError::MalformedSequenceFile(format!(
                    "sequence {} has no waypoints",
                    key
                )));
            }

            for (index, waypoint) in sequence.iter().enumerate() {
                if waypoint.len() != num_joints {
                    return Err(ConfigError::InconsistentWaypointLength {
                        key,
                        index,
                        expected: num_joints,
                        found: waypoint.len(),
                    });
                }
            }

            match sequences.entry(key) {
                Entry::Occupied(_) => return Err(ConfigError::DuplicateKey(key)),
                Entry::Vacant(v) => {
                    v.insert(sequence);
                }
            }
        }

        Ok(Self {
            num_joints,
            sequences,
        })
    }

    /// Get the sequence stored under the given key.
    pub fn get(&self, key: PositionKey) -> Option<&Sequence> {
        self.sequences.get(&key)
    }

    pub fn contains(&self, key: PositionKey) -> bool {
        self.sequences.contains_key(&key)
    }

    /// Iterate over the stored keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = PositionKey> + '_ {
        self.sequences.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    /// Check that every `(role, key)` pair names a stored sequence.
    pub fn require_keys<I>(&self, keys: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'static str, PositionKey)>,
    {
        for (role, key) in keys {
            if !self.contains(key) {
                return Err(ConfigError::MissingPositionKey { role, key });
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    const RECORDS: &str = r#"[
        {"key": 0, "positions": [[0, 90, 90, 90, 90, 0]]},
        {"key": 2, "positions": [[10, 80, 90, 90, 90, 0], [20, 70, 90, 90, 90, 0]]}
    ]"#;

    #[test]
    fn test_load_and_query() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", RECORDS).unwrap();

        let table = SequenceTable::load(file.path(), 6).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec![0, 2]);

        let seq = table.get(2).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[1], vec![20.0, 70.0, 90.0, 90.0, 90.0, 0.0]);

        assert!(table.get(7).is_none());
        assert!(!table.contains(7));
    }

    #[test]
    fn test_keyed_layout() {
        let table =
            SequenceTable::from_json(r#"{"1": [[1, 2, 3]], "0": [[0, 0, 0], [1, 1, 1]]}"#, 3)
                .unwrap();

        assert_eq!(table.keys().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(table.get(0).unwrap().len(), 2);

        assert!(matches!(
            SequenceTable::from_json(r#"{"2": [[1, 2, 3]], "02": [[1, 2, 3]]}"#, 3),
            Err(ConfigError::DuplicateKey(2))
        ));
        assert!(matches!(
            SequenceTable::from_json(r#"{"2": [[1, 2, 3]], "2": [[9, 9, 9]]}"#, 3),
            Err(ConfigError::DuplicateKey(2))
        ));
        assert!(matches!(
            SequenceTable::from_json(r#"{"home": [[1, 2, 3]]}"#, 3),
            Err(ConfigError::MalformedSequenceFile(_))
        ));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            SequenceTable::from_json(RECORDS, 5),
            Err(ConfigError::InconsistentWaypointLength {
                key: 0,
                index: 0,
                expected: 5,
                found: 6
            })
        ));

        assert!(matches!(
            SequenceTable::from_json(
                r#"[{"key": 3, "positions": [[1]]}, {"key": 3, "positions": [[2]]}]"#,
                1
            ),
            Err(ConfigError::DuplicateKey(3))
        ));

        assert!(matches!(
            SequenceTable::from_json(r#"[{"key": 3, "positions": []}]"#, 1),
            Err(ConfigError::MalformedSequenceFile(_))
        ));

        assert!(matches!(
            SequenceTable::from_json("not json", 6),
            Err(ConfigError::MalformedSequenceFile(_))
        ));

        assert!(matches!(
            SequenceTable::load("does/not/exist.json", 6),
            Err(ConfigError::FileLoad(..))
        ));
    }

    #[test]
    fn test_require_keys() {
        let table = SequenceTable::from_json(RECORDS, 6).unwrap();

        assert!(table.require_keys(vec![("home", 0), ("checkpoint", 2)]).is_ok());

        match table.require_keys(vec![("home", 0), ("active", 1)]) {
            Err(ConfigError::MissingPositionKey { role, key }) => {
                assert_eq!(role, "active");
                assert_eq!(key, 1);
            }
            r => panic!("Unexpected result {:?}", r),
        }
    }
}
