//! Checkpoint references handed out by installers.

use certpilot_common::CheckpointId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable reference to one saved checkpoint.
///
/// `seq` is the checkpoint's position in the installer's ordered history;
/// the most recent checkpoint has the highest `seq`. The number of
/// checkpoints to roll back to undo everything from `anchor` onward is
/// therefore `latest.seq - anchor.seq + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRef {
    pub id: CheckpointId,
    pub seq: usize,
    pub title: String,
    pub temporary: bool,
    pub created: DateTime<Utc>,
}

impl CheckpointRef {
    /// Rollback count that removes `self` and every later checkpoint up to
    /// and including `latest`
    pub fn rollback_count_through(&self, latest: &CheckpointRef) -> usize {
        latest.seq.saturating_sub(self.seq) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(seq: usize) -> CheckpointRef {
        CheckpointRef {
            id: CheckpointId::new(),
            seq,
            title: format!("cp-{}", seq),
            temporary: false,
            created: Utc::now(),
        }
    }

    #[test]
    fn test_rollback_count_through() {
        let anchor = checkpoint(3);
        assert_eq!(anchor.rollback_count_through(&checkpoint(3)), 1);
        assert_eq!(anchor.rollback_count_through(&checkpoint(5)), 3);
    }
}
