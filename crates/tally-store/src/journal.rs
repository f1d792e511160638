//! Flat-file account store backed by an append-only journal.
//!
//! On-disk format, one frame per committed write:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized Vec<JournalRecord>)]
//! ```
//!
//! A frame carries every record of one unit of work, so a crash mid-write
//! leaves a torn final frame that fails its length or CRC check and is
//! dropped whole on the next open. A damaged frame anywhere else refuses the
//! open with [`StoreError::Corrupt`]: replaying past it would resurrect
//! later snapshots of some accounts without the changes it carried.
//!
//! The in-memory index is only updated after the frame is written, and the
//! mutex makes each frame's check-then-append an exclusive section. An
//! exclusive lock on `<journal>.lock`, held for the store's lifetime, keeps
//! any other handle (in this process or another) from opening the journal.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tally_types::{Account, Username};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{written, AccountStore, Planned, UnitOfWork};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// A single change recorded in a journal frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    Upsert(Account),
    Remove(Username),
    Clear,
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every frame (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering; durability on [`AccountStore::flush`].
    #[default]
    OsDefault,
}

/// Replayed frame count above which [`JournalAccountStore::open`] compacts.
pub const DEFAULT_COMPACT_AFTER_FRAMES: usize = 4096;

/// Configuration for the journal store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
    /// Compact on open when replay read more frames than this. `0` disables.
    pub compact_after_frames: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            compact_after_frames: DEFAULT_COMPACT_AFTER_FRAMES,
        }
    }
}

struct JournalState {
    writer: BufWriter<File>,
    /// Byte offset just past the last complete frame.
    offset: u64,
    accounts: HashMap<Username, Account>,
}

/// Account store persisted as a CRC-framed journal file.
pub struct JournalAccountStore {
    path: PathBuf,
    state: Mutex<JournalState>,
    config: JournalConfig,
    /// Released when the store is dropped.
    _lock: File,
}

impl JournalAccountStore {
    /// Open (or create) the journal at `path` and replay it into memory.
    ///
    /// Fails with [`StoreError::Unavailable`] while another handle has the
    /// journal open, and with [`StoreError::Corrupt`] if a frame before the
    /// tail is damaged.
    pub fn open(path: &Path, config: JournalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let lock = acquire_lock(path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let (frames, valid_end) = read_frames(path, file_len)?;
        if valid_end < file_len {
            warn!(
                path = %path.display(),
                valid_end,
                file_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_end)?;
        }

        let mut accounts = HashMap::new();
        let frame_count = frames.len();
        for frame in frames {
            apply_frame(&mut accounts, frame);
        }
        info!(
            path = %path.display(),
            frames = frame_count,
            accounts = accounts.len(),
            "journal loaded"
        );

        let store = Self {
            path: path.to_path_buf(),
            state: Mutex::new(JournalState {
                writer: BufWriter::new(file),
                offset: valid_end,
                accounts,
            }),
            config,
            _lock: lock,
        };
        let threshold = store.config.compact_after_frames;
        if threshold > 0 && frame_count > threshold {
            info!(frames = frame_count, threshold, "journal over threshold; compacting");
            store.compact()?;
        }
        Ok(store)
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the journal in bytes.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.lock()?.offset)
    }

    /// Rewrite the journal as a single frame holding the current records.
    ///
    /// The new journal is written beside the old one, synced, and renamed
    /// over it, so a crash during compaction leaves either file intact.
    pub fn compact(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        let records: Vec<JournalRecord> =
            accounts.into_iter().map(JournalRecord::Upsert).collect();

        let tmp_path = self.path.with_extension("compact");
        let mut len = 0u64;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            if !records.is_empty() {
                len = write_frame(&mut tmp, &records)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        state.writer = BufWriter::new(file);
        let before = state.offset;
        state.offset = len;
        debug!(before, after = len, "journal compacted");
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, JournalState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("journal mutex poisoned: {e}")))
    }

    /// Append one frame. On failure the file is cut back to the last good
    /// offset so a partial frame never precedes later writes.
    fn append(&self, state: &mut JournalState, records: &[JournalRecord]) -> StoreResult<()> {
        let result = write_frame(&mut state.writer, records).and_then(|len| {
            state.writer.flush()?;
            if self.config.sync_mode == SyncMode::EveryWrite {
                state.writer.get_ref().sync_all()?;
            }
            Ok(len)
        });

        match result {
            Ok(len) => {
                let at = state.offset;
                state.offset += len;
                debug!(offset = at, len, records = records.len(), "journal append");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, offset = state.offset, "journal append failed; rolling back");
                self.rollback(state)?;
                Err(e)
            }
        }
    }

    fn rollback(&self, state: &mut JournalState) -> StoreResult<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut state.writer, BufWriter::new(file));
        // Dropping a BufWriter flushes it; the failed frame's bytes must not land.
        let _ = stale.into_parts();
        state.writer.get_ref().set_len(state.offset)?;
        Ok(())
    }
}

impl AccountStore for JournalAccountStore {
    fn get(&self, username: &Username) -> StoreResult<Option<Account>> {
        Ok(self.lock()?.accounts.get(username).cloned())
    }

    fn put(&self, account: &Account) -> StoreResult<()> {
        let mut state = self.lock()?;
        let mut next = account.clone();
        next.revision = state
            .accounts
            .get(&account.username)
            .map_or(1, |a| a.revision + 1);
        self.append(&mut state, &[JournalRecord::Upsert(next.clone())])?;
        state.accounts.insert(next.username.clone(), next);
        Ok(())
    }

    fn delete(&self, username: &Username) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if !state.accounts.contains_key(username) {
            return Ok(false);
        }
        self.append(&mut state, &[JournalRecord::Remove(username.clone())])?;
        state.accounts.remove(username);
        Ok(true)
    }

    fn list(&self) -> StoreResult<Vec<Account>> {
        let state = self.lock()?;
        let mut all: Vec<Account> = state.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }

    fn commit(&self, work: &UnitOfWork) -> StoreResult<Vec<Account>> {
        let mut state = self.lock()?;
        let planned = work.plan(|u| Ok(state.accounts.get(u).map(|a| a.revision)))?;
        if planned.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<JournalRecord> = planned
            .iter()
            .map(|change| match change {
                Planned::Write(account) => JournalRecord::Upsert(account.clone()),
                Planned::Remove(username) => JournalRecord::Remove(username.clone()),
            })
            .collect();
        self.append(&mut state, &records)?;
        apply_frame(&mut state.accounts, records);
        Ok(written(planned))
    }

    fn clear(&self) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let removed = state.accounts.len();
        self.append(&mut state, &[JournalRecord::Clear])?;
        state.accounts.clear();
        Ok(removed)
    }

    fn flush(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.writer.flush()?;
        state.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "journal"
    }
}

impl std::fmt::Debug for JournalAccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalAccountStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_lock(path: &Path) -> StoreResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path(path))?;
    file.try_lock_exclusive().map_err(|e| {
        StoreError::Unavailable(format!(
            "journal {} is open in another handle: {e}",
            path.display()
        ))
    })?;
    Ok(file)
}

fn apply_frame(accounts: &mut HashMap<Username, Account>, frame: Vec<JournalRecord>) {
    for record in frame {
        match record {
            JournalRecord::Upsert(account) => {
                accounts.insert(account.username.clone(), account);
            }
            JournalRecord::Remove(username) => {
                accounts.remove(&username);
            }
            JournalRecord::Clear => accounts.clear(),
        }
    }
}

/// Serialize and write one frame. Returns the number of bytes written.
fn write_frame<W: Write>(w: &mut W, records: &[JournalRecord]) -> StoreResult<u64> {
    let payload =
        bincode::serialize(records).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("journal frame exceeds 4 GiB".into()))?;
    let crc = crc32fast::hash(&payload);

    w.write_all(&length.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(HEADER_SIZE as u64 + payload.len() as u64)
}

/// Read every intact frame front-to-back.
///
/// Returns the decoded frames and the offset just past the last intact one.
/// A frame running past the end of the file, or a final frame failing its
/// CRC, is a torn tail: recovery stops there. Any other damaged frame is
/// [`StoreError::Corrupt`].
fn read_frames(path: &Path, file_len: u64) -> StoreResult<(Vec<Vec<JournalRecord>>, u64)> {
    let mut file = BufReader::new(File::open(path)?);
    let mut frames = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE as u64 <= file_len {
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; HEADER_SIZE];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 {
            return Err(StoreError::Corrupt(format!(
                "zero-length journal frame at offset {offset}"
            )));
        }
        if offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "journal frame runs past end of file; stopping recovery");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated journal frame; stopping recovery");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        let next = offset + HEADER_SIZE as u64 + length as u64;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            if next == file_len {
                warn!(offset, "CRC mismatch on final journal frame; treating as torn tail");
                break;
            }
            return Err(StoreError::Corrupt(format!(
                "CRC mismatch in journal frame at offset {offset} \
                 (expected {expected_crc:#010x}, got {actual_crc:#010x})"
            )));
        }

        let records = bincode::deserialize::<Vec<JournalRecord>>(&payload).map_err(|e| {
            StoreError::Corrupt(format!("undecodable journal frame at offset {offset}: {e}"))
        })?;
        frames.push(records);
        offset = next;
    }

    debug!(recovered = frames.len(), "journal recovery complete");
    Ok((frames, offset))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::conformance::{self, account, name};

    fn open(path: &Path) -> JournalAccountStore {
        JournalAccountStore::open(path, JournalConfig::default()).unwrap()
    }

    #[test]
    fn conformance_suite() {
        let dir = tempfile::tempdir().unwrap();
        let counter = AtomicUsize::new(0);
        conformance::run_all(&|| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let path = dir.path().join(format!("store-{n}.journal"));
            Box::new(open(&path))
        });
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        {
            let store = open(&path);
            store.put(&account("alice")).unwrap();
            store.put(&account("bob")).unwrap();
            let mut bob = store.get(&name("bob")).unwrap().unwrap();
            bob.tokens = 12;
            store.commit(&UnitOfWork::new().update(bob)).unwrap();
            store.delete(&name("alice")).unwrap();
            store.flush().unwrap();
        }

        let store = open(&path);
        assert!(store.get(&name("alice")).unwrap().is_none());
        let bob = store.get(&name("bob")).unwrap().unwrap();
        assert_eq!(bob.tokens, 12);
        assert_eq!(bob.revision, 2);
    }

    #[test]
    fn clear_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        {
            let store = open(&path);
            store.put(&account("a")).unwrap();
            store.put(&account("b")).unwrap();
            store.clear().unwrap();
            store.put(&account("c")).unwrap();
        }
        let store = open(&path);
        let names: Vec<_> = store.list().unwrap().into_iter().map(|a| a.username).collect();
        assert_eq!(names, vec![name("c")]);
    }

    #[test]
    fn torn_unit_of_work_is_dropped_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        let before;
        {
            let store = open(&path);
            store.put(&account("from")).unwrap();
            store.put(&account("to")).unwrap();
            before = store.offset().unwrap();

            let mut from = store.get(&name("from")).unwrap().unwrap();
            let mut to = store.get(&name("to")).unwrap().unwrap();
            from.tokens = 1;
            to.tokens = 2;
            store.commit(&UnitOfWork::new().update(from).update(to)).unwrap();
        }

        // Simulate a crash midway through the transfer frame.
        let total = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(total - 5).unwrap();
        drop(file);

        let store = open(&path);
        assert_eq!(store.offset().unwrap(), before);
        assert_eq!(store.get(&name("from")).unwrap().unwrap().tokens, 0);
        assert_eq!(store.get(&name("to")).unwrap().unwrap().tokens, 0);

        // The file was cut back, so new frames land on a clean boundary.
        store.put(&account("later")).unwrap();
        drop(store);
        let store = open(&path);
        assert!(store.exists(&name("later")).unwrap());
    }

    /// Flip one payload byte of the frame starting at `frame_offset`.
    fn flip_payload_byte(path: &Path, frame_offset: u64) {
        let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let at = frame_offset + HEADER_SIZE as u64;
        file.seek(SeekFrom::Start(at)).unwrap();
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        file.seek(SeekFrom::Start(at)).unwrap();
        file.write_all(&buf).unwrap();
        file.sync_all().unwrap();
    }

    fn move_tokens(store: &JournalAccountStore, from: &str, to: &str, amount: i64) {
        let mut from = store.get(&name(from)).unwrap().unwrap();
        let mut to = store.get(&name(to)).unwrap().unwrap();
        from.tokens -= amount;
        to.tokens += amount;
        store.commit(&UnitOfWork::new().update(from).update(to)).unwrap();
    }

    #[test]
    fn damaged_middle_frame_refuses_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        let damaged_at;
        {
            let store = open(&path);
            let mut a = account("a");
            a.tokens = 50;
            store.put(&a).unwrap();
            store.put(&account("b")).unwrap();
            store.put(&account("c")).unwrap();
            damaged_at = store.offset().unwrap();
            move_tokens(&store, "a", "b", 20);
            move_tokens(&store, "a", "c", 10);
        }
        let len_before = fs::metadata(&path).unwrap().len();
        flip_payload_byte(&path, damaged_at);

        let err = JournalAccountStore::open(&path, JournalConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)), "{err}");
        // Nothing was truncated; the damage is left for inspection.
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
    }

    #[test]
    fn damaged_final_frame_is_a_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        let last_at;
        {
            let store = open(&path);
            store.put(&account("first")).unwrap();
            last_at = store.offset().unwrap();
            store.put(&account("second")).unwrap();
        }
        flip_payload_byte(&path, last_at);

        let store = open(&path);
        assert!(store.exists(&name("first")).unwrap());
        assert!(!store.exists(&name("second")).unwrap());
        assert_eq!(store.offset().unwrap(), last_at);
    }

    #[test]
    fn second_handle_on_same_journal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.journal");
        let first = open(&path);
        let err = JournalAccountStore::open(&path, JournalConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)), "{err}");

        first.put(&account("owner")).unwrap();
        drop(first);
        let reopened = open(&path);
        assert!(reopened.exists(&name("owner")).unwrap());
    }

    #[test]
    fn lock_survives_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compacting.journal");
        let store = open(&path);
        store.put(&account("x")).unwrap();
        store.compact().unwrap();
        assert!(matches!(
            JournalAccountStore::open(&path, JournalConfig::default()),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn open_compacts_long_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.journal");
        let config = JournalConfig {
            compact_after_frames: 8,
            ..Default::default()
        };
        let grown;
        {
            let store = JournalAccountStore::open(&path, config.clone()).unwrap();
            let mut a = account("busy");
            for i in 0..20 {
                a.tokens = i;
                store.put(&a).unwrap();
            }
            grown = store.offset().unwrap();
        }

        let store = JournalAccountStore::open(&path, config.clone()).unwrap();
        assert!(store.offset().unwrap() < grown);
        assert_eq!(fs::metadata(&path).unwrap().len(), store.offset().unwrap());
        let busy = store.get(&name("busy")).unwrap().unwrap();
        assert_eq!(busy.tokens, 19);
        assert_eq!(busy.revision, 20);
    }

    #[test]
    fn compaction_threshold_zero_disables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.journal");
        let config = JournalConfig {
            compact_after_frames: 0,
            ..Default::default()
        };
        let grown;
        {
            let store = JournalAccountStore::open(&path, config.clone()).unwrap();
            for i in 0..5 {
                store.put(&account(&format!("u{i}"))).unwrap();
            }
            grown = store.offset().unwrap();
        }
        let store = JournalAccountStore::open(&path, config).unwrap();
        assert_eq!(store.offset().unwrap(), grown);
    }

    #[test]
    fn compact_shrinks_and_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        let store = open(&path);
        let mut a = account("alice");
        for i in 0..20 {
            a.tokens = i;
            store.put(&a).unwrap();
        }
        store.put(&account("bob")).unwrap();
        let before = store.offset().unwrap();

        store.compact().unwrap();
        let after = store.offset().unwrap();
        assert!(after < before);

        store.put(&account("carol")).unwrap();
        drop(store);

        let store = open(&path);
        let alice = store.get(&name("alice")).unwrap().unwrap();
        assert_eq!(alice.tokens, 19);
        assert_eq!(alice.revision, 20);
        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn compact_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.journal");
        let store = open(&path);
        store.put(&account("a")).unwrap();
        store.clear().unwrap();
        store.compact().unwrap();
        assert_eq!(store.offset().unwrap(), 0);
        drop(store);
        assert!(open(&path).list().unwrap().is_empty());
    }

    #[test]
    fn sync_every_write_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.journal");
        let store = JournalAccountStore::open(
            &path,
            JournalConfig {
                sync_mode: SyncMode::EveryWrite,
                ..Default::default()
            },
        )
        .unwrap();
        store.put(&account("durable")).unwrap();
        assert!(store.exists(&name("durable")).unwrap());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("a.journal");
        let store = open(&path);
        store.put(&account("x")).unwrap();
        assert!(path.exists());
    }
}
