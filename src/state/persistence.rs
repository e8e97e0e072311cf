//! Snapshot persistence for the account store.
//!
//! Two JSON snapshot files (accounts, sessions) written by a debounced
//! writer task, plus an optional redb mirror keyed the same way a remote
//! cache would be: `accounts` by id, `sessions` by token, and a `usernames`
//! secondary index mapping lowercase username → account id.
//!
//! Failures are logged and retried on the next dirty signal; they never
//! reach request handlers. Losing both the snapshot and the mirror just
//! means the store boots empty and the next registration is promoted to
//! admin again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::error::PersistError;
use crate::state::account::Account;
use crate::state::managers::AccountManager;
use crate::state::session::Session;

const SNAPSHOT_VERSION: u32 = 1;

const ACCOUNTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("accounts");
const SESSIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("sessions");
const USERNAMES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("usernames");

/// Accounts snapshot file layout.
#[derive(Debug, Serialize, Deserialize)]
struct AccountsSnapshot {
    version: u32,
    generated_at: i64,
    accounts: Vec<Account>,
}

/// Sessions snapshot file layout.
#[derive(Debug, Serialize, Deserialize)]
struct SessionsSnapshot {
    version: u32,
    generated_at: i64,
    sessions: Vec<Session>,
}

/// Snapshot file store with optional redb mirror.
pub struct SnapshotStore {
    accounts_path: PathBuf,
    sessions_path: PathBuf,
    mirror: Option<Database>,
}

impl SnapshotStore {
    /// Open the store under `data_dir`, creating the mirror when enabled.
    pub fn open(data_dir: impl AsRef<Path>, mirror: bool) -> Result<Self, PersistError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let mirror = if mirror {
            let db = Database::create(data_dir.join("mirror.redb"))
                .map_err(|e| PersistError::Mirror(e.to_string()))?;
            Some(db)
        } else {
            None
        };
        Ok(Self {
            accounts_path: data_dir.join("accounts.json"),
            sessions_path: data_dir.join("sessions.json"),
            mirror,
        })
    }

    /// Write both snapshots (atomic per file: temp + rename), then refresh
    /// the mirror.
    pub fn save(&self, accounts: &[Account], sessions: &[Session]) -> Result<(), PersistError> {
        let now = chrono::Utc::now().timestamp_millis();
        write_json(
            &self.accounts_path,
            &AccountsSnapshot {
                version: SNAPSHOT_VERSION,
                generated_at: now,
                accounts: accounts.to_vec(),
            },
        )?;
        write_json(
            &self.sessions_path,
            &SessionsSnapshot {
                version: SNAPSHOT_VERSION,
                generated_at: now,
                sessions: sessions.to_vec(),
            },
        )?;
        if let Some(db) = &self.mirror {
            mirror_save(db, accounts, sessions)?;
        }
        debug!(
            accounts = accounts.len(),
            sessions = sessions.len(),
            "snapshots written"
        );
        Ok(())
    }

    /// Load both snapshots. Missing files yield empty state; a corrupt
    /// snapshot falls back to the mirror when one exists.
    pub fn load(&self) -> (Vec<Account>, Vec<Session>) {
        let accounts = match read_json::<AccountsSnapshot>(&self.accounts_path) {
            Ok(Some(snapshot)) => Some(snapshot.accounts),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, path = %self.accounts_path.display(), "accounts snapshot unreadable");
                None
            }
        };
        let sessions = match read_json::<SessionsSnapshot>(&self.sessions_path) {
            Ok(Some(snapshot)) => Some(snapshot.sessions),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, path = %self.sessions_path.display(), "sessions snapshot unreadable");
                None
            }
        };

        match (accounts, sessions) {
            (Some(a), Some(s)) => (a, s),
            (a, s) => {
                if let Some(db) = &self.mirror {
                    match mirror_load(db) {
                        Ok((ma, ms)) => {
                            info!("rehydrating from mirror");
                            (a.unwrap_or(ma), s.unwrap_or(ms))
                        }
                        Err(e) => {
                            error!(error = %e, "mirror unreadable, starting empty");
                            (a.unwrap_or_default(), s.unwrap_or_default())
                        }
                    }
                } else {
                    (a.unwrap_or_default(), s.unwrap_or_default())
                }
            }
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let tmp = path.with_extension("json.tmp");
    let encoded = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, encoded)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, PersistError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn mirror_save(
    db: &Database,
    accounts: &[Account],
    sessions: &[Session],
) -> Result<(), PersistError> {
    let mirror = |e: redb::Error| PersistError::Mirror(e.to_string());
    let txn = db.begin_write().map_err(|e| mirror(e.into()))?;
    // Full rewrite each time: drop and repopulate every table.
    for table in [ACCOUNTS_TABLE, USERNAMES_TABLE, SESSIONS_TABLE] {
        txn.delete_table(table).map_err(|e| mirror(e.into()))?;
    }
    {
        let mut table = txn.open_table(ACCOUNTS_TABLE).map_err(|e| mirror(e.into()))?;
        for account in accounts {
            let encoded = serde_json::to_string(account)?;
            table
                .insert(account.id.as_str(), encoded.as_str())
                .map_err(|e| mirror(e.into()))?;
        }
    }
    {
        let mut table = txn.open_table(USERNAMES_TABLE).map_err(|e| mirror(e.into()))?;
        for account in accounts {
            table
                .insert(account.username.as_str(), account.id.as_str())
                .map_err(|e| mirror(e.into()))?;
        }
    }
    {
        let mut table = txn.open_table(SESSIONS_TABLE).map_err(|e| mirror(e.into()))?;
        for session in sessions {
            let encoded = serde_json::to_string(session)?;
            table
                .insert(session.token.as_str(), encoded.as_str())
                .map_err(|e| mirror(e.into()))?;
        }
    }
    txn.commit().map_err(|e| mirror(e.into()))?;
    Ok(())
}

fn mirror_load(db: &Database) -> Result<(Vec<Account>, Vec<Session>), PersistError> {
    let mirror = |e: redb::Error| PersistError::Mirror(e.to_string());
    let txn = db.begin_read().map_err(|e| mirror(e.into()))?;
    let mut accounts = Vec::new();
    if let Ok(table) = txn.open_table(ACCOUNTS_TABLE) {
        for entry in table.iter().map_err(|e| mirror(e.into()))? {
            let (_, value) = entry.map_err(|e| mirror(e.into()))?;
            accounts.push(serde_json::from_str(value.value())?);
        }
    }
    let mut sessions = Vec::new();
    if let Ok(table) = txn.open_table(SESSIONS_TABLE) {
        for entry in table.iter().map_err(|e| mirror(e.into()))? {
            let (_, value) = entry.map_err(|e| mirror(e.into()))?;
            sessions.push(serde_json::from_str(value.value())?);
        }
    }
    Ok((accounts, sessions))
}

/// Debounced snapshot writer.
///
/// Waits for a dirty signal, sleeps out the debounce window (absorbing any
/// further signals), then writes. On failure the dirty flag is re-armed so
/// the next tick retries. A final flush runs on shutdown.
pub async fn run_snapshot_writer(
    accounts: Arc<AccountManager>,
    store: SnapshotStore,
    debounce: Duration,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut retry_pending = false;
    let mut retry_tick = tokio::time::interval(Duration::from_secs(5));
    retry_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let flush = |store: &SnapshotStore| {
        let (account_data, session_data) = accounts.snapshot_data();
        store.save(&account_data, &session_data)
    };

    loop {
        tokio::select! {
            signal = dirty_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                tokio::time::sleep(debounce).await;
                // Absorb signals that arrived during the window.
                while dirty_rx.try_recv().is_ok() {}
                if let Err(e) = flush(&store) {
                    warn!(error = %e, "snapshot write failed, will retry");
                    retry_pending = true;
                } else {
                    retry_pending = false;
                }
            }
            _ = retry_tick.tick(), if retry_pending => {
                match flush(&store) {
                    Ok(()) => {
                        info!("snapshot retry succeeded");
                        retry_pending = false;
                    }
                    Err(e) => warn!(error = %e, "snapshot retry failed"),
                }
            }
            _ = shutdown_rx.recv() => {
                if let Err(e) = flush(&store) {
                    error!(error = %e, "final snapshot flush failed");
                } else {
                    info!("final snapshot flushed");
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use hearth_proto::Role;
    use std::collections::{BTreeMap, BTreeSet};

    fn account(id: &str, username: &str) -> Account {
        Account {
            id: id.into(),
            username: username.into(),
            verifier: "$argon2id$stub".into(),
            display_name: "A".into(),
            roles: BTreeSet::from([Role::Admin]),
            status: crate::state::account::AccountStatus::Active,
            disabled_reason: None,
            email: None,
            bio: None,
            avatar_url: None,
            metadata: BTreeMap::new(),
            created_at: 1,
            updated_at: 1,
        }
    }

    fn session(token: &str, account_id: &str, expires_at: i64) -> Session {
        Session {
            token: token.into(),
            account_id: account_id.into(),
            created_at: 0,
            last_seen_at: 0,
            expires_at,
        }
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), false).unwrap();
        store
            .save(
                &[account("a1", "alice@x.io")],
                &[session("t1", "a1", i64::MAX)],
            )
            .unwrap();

        let reopened = SnapshotStore::open(dir.path(), false).unwrap();
        let (accounts, sessions) = reopened.load();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "alice@x.io");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].token, "t1");
    }

    #[test]
    fn missing_snapshots_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), false).unwrap();
        let (accounts, sessions) = store.load();
        assert!(accounts.is_empty());
        assert!(sessions.is_empty());
    }

    #[test]
    fn mirror_recovers_lost_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path(), true).unwrap();
        store.save(&[account("a1", "alice@x.io")], &[]).unwrap();
        drop(store);

        // Lose the JSON files; the mirror survives.
        std::fs::remove_file(dir.path().join("accounts.json")).unwrap();
        std::fs::remove_file(dir.path().join("sessions.json")).unwrap();

        let reopened = SnapshotStore::open(dir.path(), true).unwrap();
        let (accounts, _) = reopened.load();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, "a1");
    }

    #[tokio::test]
    async fn writer_flushes_on_dirty_signal() {
        let dir = tempfile::tempdir().unwrap();
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(AccountManager::new(
            AuthConfig {
                kdf_memory_kib: 8192,
                kdf_iterations: 1,
                ..Default::default()
            },
            dirty_tx,
        ));
        manager
            .register("alice@x.io", "correcthorse", None)
            .await
            .unwrap();

        let store = SnapshotStore::open(dir.path(), false).unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let writer = tokio::spawn(run_snapshot_writer(
            manager.clone(),
            store,
            Duration::from_millis(10),
            dirty_rx,
            shutdown_tx.subscribe(),
        ));

        // The registration above queued a dirty signal already.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let reopened = SnapshotStore::open(dir.path(), false).unwrap();
        let (accounts, _) = reopened.load();
        assert_eq!(accounts.len(), 1);

        let _ = shutdown_tx.send(());
        let _ = writer.await;
    }
}
