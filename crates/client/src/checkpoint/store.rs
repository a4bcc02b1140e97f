//! Checkpoint storage
//!
//! Keeps an append-only history of configuration snapshots for one live
//! configuration directory.
//!
//! # Directory Structure
//!
//! ```text
//! checkpoints/
//! ├── index.json          # Ordered checkpoint log, oldest first
//! └── <checkpoint-id>/
//!     └── backup/         # Live tree as it was before the checkpoint's write
//! ```
//!
//! A checkpoint records what the live directory looked like *before* the
//! save that created it, so rolling back one checkpoint means writing its
//! backup over the live directory and dropping it from the log.

use std::fs;
use std::path::{Path, PathBuf};

use certpilot_common::CheckpointId;
use certpilot_config::UntitledSavePolicy;
use certpilot_plugin_api::{CheckpointRef, PluginError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::tree::ConfigTree;

const INDEX_FILE: &str = "index.json";
const BACKUP_DIR: &str = "backup";

/// One entry of the checkpoint log
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointEntry {
    id: CheckpointId,
    title: String,
    temporary: bool,
    created: DateTime<Utc>,
    /// Digest of the backup tree, checked before every restore
    digest: String,
    files: usize,
}

impl CheckpointEntry {
    fn to_ref(&self, seq: usize) -> CheckpointRef {
        CheckpointRef {
            id: self.id.clone(),
            seq,
            title: self.title.clone(),
            temporary: self.temporary,
            created: self.created,
        }
    }
}

/// Versioned snapshots of one configuration directory.
///
/// Not safe for concurrent use from several processes; within a process
/// the owning installer is serialised by the orchestrator.
#[derive(Debug)]
pub struct CheckpointStore {
    /// Checkpoint storage directory
    root: PathBuf,
    /// Live configuration directory
    live: PathBuf,
    policy: UntitledSavePolicy,
    /// Oldest first; position is the checkpoint's `seq`
    entries: Vec<CheckpointEntry>,
}

impl CheckpointStore {
    /// Open (or create) the store at `root` guarding `live`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Persistence`] if the directories cannot be
    /// created or an existing index cannot be parsed.
    pub fn open(root: &Path, live: &Path, policy: UntitledSavePolicy) -> Result<Self, PluginError> {
        fs::create_dir_all(root)
            .map_err(|e| PluginError::persistence(root.display(), e))?;
        fs::create_dir_all(live)
            .map_err(|e| PluginError::persistence(live.display(), e))?;

        // Backups may contain private keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(root, fs::Permissions::from_mode(0o700))
                .map_err(|e| PluginError::persistence(root.display(), e))?;
        }

        let index_path = root.join(INDEX_FILE);
        let entries = if index_path.exists() {
            let content = fs::read_to_string(&index_path)
                .map_err(|e| PluginError::persistence(index_path.display(), e))?;
            serde_json::from_str(&content)
                .map_err(|e| PluginError::persistence(index_path.display(), e))?
        } else {
            trace!("No checkpoint index found, starting empty history");
            Vec::new()
        };

        info!(
            store = %root.display(),
            live = %live.display(),
            checkpoints = entries.len(),
            "Opened checkpoint store"
        );

        Ok(Self {
            root: root.to_path_buf(),
            live: live.to_path_buf(),
            policy,
            entries,
        })
    }

    /// Number of checkpoints, temporary ones included
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Current contents of the live directory
    pub fn read_live(&self) -> Result<ConfigTree, PluginError> {
        ConfigTree::read_dir(&self.live).map_err(|e| PluginError::persistence(self.live.display(), e))
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Record a checkpoint and write `staged` to the live directory.
    ///
    /// A permanent save absorbs the temporary checkpoints directly below
    /// it: the new entry takes over the earliest one's backup, so rolling
    /// it back returns to the state before the first of them.
    ///
    /// On failure the log and the live directory are left as they were.
    pub fn save(
        &mut self,
        staged: &ConfigTree,
        title: Option<&str>,
        temporary: bool,
    ) -> Result<CheckpointRef, PluginError> {
        let created = Utc::now();
        let title = self.resolve_title(title, temporary, created)?;

        let keep = if temporary {
            self.entries.len()
        } else {
            self.entries
                .iter()
                .rposition(|entry| !entry.temporary)
                .map_or(0, |last_durable| last_durable + 1)
        };

        let before = match self.entries.get(keep) {
            Some(earliest_temporary) => self
                .load_backup(earliest_temporary)
                .map_err(PluginError::Persistence)?,
            None => self.read_live()?,
        };

        let entry = CheckpointEntry {
            id: CheckpointId::new(),
            title,
            temporary,
            created,
            digest: before.digest(),
            files: before.len(),
        };

        let backup_path = self.backup_path(&entry.id);
        before
            .write_to(&backup_path)
            .map_err(|e| self.abandon(&entry.id, PluginError::persistence(backup_path.display(), e)))?;

        let mut entries = self.entries[..keep].to_vec();
        entries.push(entry.clone());
        self.write_index(&entries)
            .map_err(|e| self.abandon(&entry.id, e))?;

        if let Err(e) = staged.write_to(&self.live) {
            let err = PluginError::persistence(self.live.display(), e);
            if let Err(restore) = before.write_to(&self.live) {
                warn!(error = %restore, "Failed to restore live configuration after failed save");
            }
            if let Err(index) = self.write_index(&self.entries) {
                warn!(error = %index, "Failed to restore checkpoint index after failed save");
            }
            return Err(self.abandon(&entry.id, err));
        }

        let absorbed: Vec<CheckpointEntry> = self.entries.drain(keep..).collect();
        self.entries = entries;
        for old in &absorbed {
            self.remove_backup(&old.id);
        }

        let seq = self.entries.len() - 1;
        let checkpoint = entry.to_ref(seq);

        if temporary {
            debug!(seq = seq, id = %checkpoint.id, "Saved temporary checkpoint");
        } else {
            info!(
                seq = seq,
                id = %checkpoint.id,
                title = %checkpoint.title,
                absorbed = absorbed.len(),
                "Saved checkpoint"
            );
        }

        Ok(checkpoint)
    }

    fn resolve_title(
        &self,
        title: Option<&str>,
        temporary: bool,
        created: DateTime<Utc>,
    ) -> Result<String, PluginError> {
        let stamp = created.format("%Y%m%dT%H%M%S%.3fZ");
        if temporary {
            return Ok(format!("temporary-{}", stamp));
        }
        match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => Ok(title.to_string()),
            None => match self.policy {
                UntitledSavePolicy::Synthesize => Ok(format!("checkpoint-{}", stamp)),
                UntitledSavePolicy::Reject => Err(PluginError::UntitledCheckpoint),
            },
        }
    }

    // =========================================================================
    // Rollback
    // =========================================================================

    /// Undo the `count` most recent checkpoints, newest first.
    ///
    /// Asking for more checkpoints than exist rolls back the whole history.
    /// A corrupt checkpoint stops the walk: everything newer than it stays
    /// rolled back and [`PluginError::Rollback`] reports how far it got.
    pub fn rollback_checkpoints(&mut self, count: usize) -> Result<(), PluginError> {
        if count > self.entries.len() {
            warn!(
                requested = count,
                available = self.entries.len(),
                "Rollback request exceeds checkpoint history, restoring earliest state"
            );
        }
        let count = count.min(self.entries.len());

        for restored in 0..count {
            let Some(entry) = self.entries.last().cloned() else {
                break;
            };

            let before = self
                .load_backup(&entry)
                .map_err(|reason| PluginError::Rollback { restored, reason })?;

            before.write_to(&self.live).map_err(|e| PluginError::Rollback {
                restored,
                reason: format!("writing {}: {}", self.live.display(), e),
            })?;

            // Leave the entry in place if the index cannot be updated;
            // restoring it again later is harmless.
            let remaining = &self.entries[..self.entries.len() - 1];
            self.write_index(remaining)
                .map_err(|e| PluginError::Rollback {
                    restored,
                    reason: e.to_string(),
                })?;
            self.entries.pop();
            self.remove_backup(&entry.id);

            info!(
                id = %entry.id,
                title = %entry.title,
                temporary = entry.temporary,
                "Rolled back checkpoint"
            );
        }

        Ok(())
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Durable checkpoints, most recent first.
    ///
    /// The iterator is lazy and can be restarted by calling this again.
    pub fn display_checkpoints(&self) -> impl Iterator<Item = CheckpointRef> + '_ {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, entry)| !entry.temporary)
            .map(|(seq, entry)| entry.to_ref(seq))
    }

    /// Every checkpoint, temporary ones included, most recent first
    pub fn history(&self) -> impl Iterator<Item = CheckpointRef> + '_ {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .map(|(seq, entry)| entry.to_ref(seq))
    }

    // =========================================================================
    // Storage helpers
    // =========================================================================

    fn backup_path(&self, id: &CheckpointId) -> PathBuf {
        self.root.join(id.as_str()).join(BACKUP_DIR)
    }

    /// Read a checkpoint's backup and check it against the recorded digest
    fn load_backup(&self, entry: &CheckpointEntry) -> Result<ConfigTree, String> {
        let path = self.backup_path(&entry.id);
        if !path.is_dir() {
            return Err(format!("checkpoint {} has no backup at {}", entry.id, path.display()));
        }
        let tree = ConfigTree::read_dir(&path)
            .map_err(|e| format!("reading checkpoint {}: {}", entry.id, e))?;
        if tree.digest() != entry.digest {
            return Err(format!("checkpoint {} is corrupt (digest mismatch)", entry.id));
        }
        Ok(tree)
    }

    fn write_index(&self, entries: &[CheckpointEntry]) -> Result<(), PluginError> {
        let index_path = self.root.join(INDEX_FILE);
        let tmp_path = self.root.join(format!("{}.tmp", INDEX_FILE));
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| PluginError::persistence("serializing checkpoint index", e))?;
        fs::write(&tmp_path, content)
            .map_err(|e| PluginError::persistence(tmp_path.display(), e))?;
        fs::rename(&tmp_path, &index_path)
            .map_err(|e| PluginError::persistence(index_path.display(), e))?;
        Ok(())
    }

    fn remove_backup(&self, id: &CheckpointId) {
        let dir = self.root.join(id.as_str());
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(id = %id, error = %e, "Failed to remove checkpoint backup");
        }
    }

    /// Drop a half-written checkpoint and pass its error through
    fn abandon(&self, id: &CheckpointId, err: PluginError) -> PluginError {
        let dir = self.root.join(id.as_str());
        if dir.exists() {
            self.remove_backup(id);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(policy: UntitledSavePolicy) -> (TempDir, CheckpointStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(
            &temp_dir.path().join("checkpoints"),
            &temp_dir.path().join("live"),
            policy,
        )
        .unwrap();
        (temp_dir, store)
    }

    fn tree(files: &[(&str, &str)]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for (path, contents) in files {
            tree.insert(*path, *contents);
        }
        tree
    }

    #[test]
    fn test_save_writes_live_and_rollback_restores() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        let v1 = tree(&[("site.toml", "v1")]);
        store.save(&v1, Some("first"), false).unwrap();
        assert_eq!(store.read_live().unwrap(), v1);

        let v2 = tree(&[("site.toml", "v2"), ("extra.pem", "pem")]);
        store.save(&v2, Some("second"), false).unwrap();
        assert_eq!(store.read_live().unwrap(), v2);

        store.rollback_checkpoints(1).unwrap();
        assert_eq!(store.read_live().unwrap(), v1);
        assert_eq!(store.depth(), 1);
    }

    #[test]
    fn test_rollback_on_empty_history_is_noop() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        store.rollback_checkpoints(1).unwrap();
        store.rollback_checkpoints(5).unwrap();
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn test_rollback_beyond_history_restores_earliest_state() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        store.save(&tree(&[("a", "1")]), Some("one"), false).unwrap();
        store.save(&tree(&[("a", "2")]), Some("two"), false).unwrap();

        store.rollback_checkpoints(10).unwrap();

        assert!(store.read_live().unwrap().is_empty());
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn test_temporary_hidden_from_display() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        store.save(&tree(&[("a", "1")]), Some("durable"), false).unwrap();
        let temp = store.save(&tree(&[("a", "2")]), Some("ignored"), true).unwrap();

        assert!(temp.temporary);
        assert!(temp.title.starts_with("temporary-"));
        let listed: Vec<_> = store.display_checkpoints().collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "durable");
        assert_eq!(store.history().count(), 2);
    }

    #[test]
    fn test_display_is_most_recent_first_and_restartable() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        store.save(&tree(&[("a", "1")]), Some("one"), false).unwrap();
        store.save(&tree(&[("a", "2")]), Some("two"), false).unwrap();

        let titles: Vec<_> = store.display_checkpoints().map(|c| c.title).collect();
        assert_eq!(titles, vec!["two", "one"]);
        assert_eq!(store.display_checkpoints().count(), 2);
    }

    #[test]
    fn test_permanent_save_absorbs_temporaries() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        let original = tree(&[("a", "0")]);
        store.save(&original, Some("base"), false).unwrap();

        let anchor = store.save(&tree(&[("a", "0")]), None, true).unwrap();
        store.save(&tree(&[("a", "1")]), None, true).unwrap();
        let committed = store.save(&tree(&[("a", "2")]), Some("deploy"), false).unwrap();

        assert_eq!(committed.seq, anchor.seq);
        assert_eq!(store.depth(), 2);
        assert_eq!(store.history().filter(|c| c.temporary).count(), 0);

        store.rollback_checkpoints(1).unwrap();
        assert_eq!(store.read_live().unwrap(), original);
    }

    #[test]
    fn test_untitled_synthesized() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        let checkpoint = store.save(&tree(&[("a", "1")]), None, false).unwrap();
        assert!(checkpoint.title.starts_with("checkpoint-"));
    }

    #[test]
    fn test_untitled_rejected() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Reject);
        let result = store.save(&tree(&[("a", "1")]), Some("   "), false);

        assert!(matches!(result, Err(PluginError::UntitledCheckpoint)));
        assert_eq!(store.depth(), 0);
        assert!(store.read_live().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_checkpoint_stops_rollback() {
        let (_dir, mut store) = setup(UntitledSavePolicy::Synthesize);
        let first = store.save(&tree(&[("a", "1")]), Some("one"), false).unwrap();
        store.save(&tree(&[("a", "2")]), Some("two"), false).unwrap();
        store.save(&tree(&[("a", "3")]), Some("three"), false).unwrap();

        // Tamper with the oldest backup
        let backup = store.backup_path(&first.id);
        fs::write(backup.join("tampered"), "x").unwrap();

        let err = store.rollback_checkpoints(3).unwrap_err();

        match err {
            PluginError::Rollback { restored, reason } => {
                assert_eq!(restored, 2);
                assert!(reason.contains("corrupt"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Stopped at the last good point: state before "two"
        assert_eq!(store.read_live().unwrap(), tree(&[("a", "1")]));
        assert_eq!(store.depth(), 1);
    }

    #[test]
    fn test_reopen_keeps_history() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("checkpoints");
        let live = temp_dir.path().join("live");
        {
            let mut store = CheckpointStore::open(&root, &live, UntitledSavePolicy::Synthesize).unwrap();
            store.save(&tree(&[("a", "1")]), Some("one"), false).unwrap();
        }

        let mut store = CheckpointStore::open(&root, &live, UntitledSavePolicy::Synthesize).unwrap();
        assert_eq!(store.depth(), 1);
        store.rollback_checkpoints(1).unwrap();
        assert!(store.read_live().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_index_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("checkpoints");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(INDEX_FILE), "not json").unwrap();

        let result = CheckpointStore::open(&root, &temp_dir.path().join("live"), UntitledSavePolicy::Synthesize);
        assert!(matches!(result, Err(PluginError::Persistence(_))));
    }
}
