//! # Checkpoint set
//!
//! The positions visited during a search and the pick position belonging to each of them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashSet;

use comms_if::eqpt::arm::PositionKey;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::seq_store::ConfigError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A position at which a frame is captured, and the position which picks the object from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "checkpoint")]
    pub key: PositionKey,

    pub pick: PositionKey,
}

/// Validated, ordered set of checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSet {
    checkpoints: Vec<Checkpoint>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Checkpoint {
    pub fn new(key: PositionKey, pick: PositionKey) -> Self {
        Self { key, pick }
    }
}

impl CheckpointSet {
    /// Validate the checkpoints against the reserved home and active keys.
    ///
    /// Checkpoint keys must be unique, and no checkpoint or pick key may be a reserved key.
    pub fn new(
        checkpoints: Vec<Checkpoint>,
        home_key: PositionKey,
        active_key: PositionKey,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();

        for cp in checkpoints.iter() {
            if !seen.insert(cp.key) {
                return Err(ConfigError::InvalidCheckpointSet(format!(
                    "checkpoint {} is listed more than once",
                    cp.key
                )));
            }

            for (role, key) in [("checkpoint", cp.key), ("pick", cp.pick)].iter() {
                if *key == home_key || *key == active_key {
                    return Err(ConfigError::InvalidCheckpointSet(format!(
                        "{} key {} is reserved for the home or active position",
                        role, key
                    )));
                }
            }
        }

        Ok(Self { checkpoints })
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    /// The pick position belonging to a checkpoint.
    pub fn pick_for(&self, key: PositionKey) -> Option<PositionKey> {
        self.checkpoints
            .iter()
            .find(|cp| cp.key == key)
            .map(|cp| cp.pick)
    }

    /// Every key the search may command, with the role it plays.
    pub fn required_keys(&self) -> Vec<(&'static str, PositionKey)> {
        self.checkpoints
            .iter()
            .flat_map(|cp| vec![("checkpoint", cp.key), ("pick", cp.pick)])
            .collect()
    }

    /// The order in which the checkpoints are visited.
    ///
    /// Without shuffling this is the configured order. With shuffling the order is random, or
    /// reproducible if a seed is given.
    pub fn visit_order(&self, shuffle: bool, seed: Option<u64>) -> Vec<Checkpoint> {
        let mut order = self.checkpoints.clone();

        if shuffle {
            match seed {
                Some(s) => order.shuffle(&mut StdRng::seed_from_u64(s)),
                None => order.shuffle(&mut rand::rng()),
            }
        }

        order
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn cps() -> Vec<Checkpoint> {
        vec![
            Checkpoint::new(2, 3),
            Checkpoint::new(4, 5),
            Checkpoint::new(6, 7),
        ]
    }

    #[test]
    fn test_validation() {
        let set = CheckpointSet::new(cps(), 0, 1).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.pick_for(4), Some(5));
        assert_eq!(set.pick_for(5), None);
        assert_eq!(
            set.required_keys(),
            vec![
                ("checkpoint", 2),
                ("pick", 3),
                ("checkpoint", 4),
                ("pick", 5),
                ("checkpoint", 6),
                ("pick", 7)
            ]
        );

        let dup = vec![Checkpoint::new(2, 3), Checkpoint::new(2, 5)];
        assert!(matches!(
            CheckpointSet::new(dup, 0, 1),
            Err(ConfigError::InvalidCheckpointSet(_))
        ));

        assert!(matches!(
            CheckpointSet::new(vec![Checkpoint::new(1, 3)], 0, 1),
            Err(ConfigError::InvalidCheckpointSet(_))
        ));
        assert!(matches!(
            CheckpointSet::new(vec![Checkpoint::new(2, 0)], 0, 1),
            Err(ConfigError::InvalidCheckpointSet(_))
        ));
    }

    #[test]
    fn test_visit_order() {
        let set = CheckpointSet::new(cps(), 0, 1).unwrap();

        assert_eq!(set.visit_order(false, Some(3)), cps());

        // Same seed, same order
        let a = set.visit_order(true, Some(42));
        let b = set.visit_order(true, Some(42));
        assert_eq!(a, b);

        // Shuffling never drops or repeats a checkpoint
        let mut keys = set
            .visit_order(true, None)
            .iter()
            .map(|cp| cp.key)
            .collect::<Vec<_>>();
        keys.sort_unstable();
        assert_eq!(keys, vec![2, 4, 6]);
    }
}
