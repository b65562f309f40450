//! Workspace persistence: per-stage JSON documents, atomic writes, single-writer lock
//!
//! Layout under `<workspace>/.soul/`:
//!
//! ```text
//! signals.json      every signal ever ingested (deduped by id)
//! principles.json   principle set of the last run
//! axioms.json       kept + pruned axioms, cascade, guardrails
//! soul.json         the durable aggregate
//! synthesis.lock    present while a run holds the workspace
//! synthesis.lock.recover
//!                   present while a contender clears a stale lock
//! ```
//!
//! A run commits by staging every document to a temp file and then renaming
//! them into place with `soul.json` last. The soul is the commit point: per-stage
//! files newer than the soul belong to a run that did not finish.

use crate::compressor::CompressionResult;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use soulcraft_core::{Error, Result, Signal, Soul};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub const STATE_DIR: &str = ".soul";
const LOCK_FILE: &str = "synthesis.lock";
const RECOVER_FILE: &str = "synthesis.lock.recover";
const SOUL_FILE: &str = "soul.json";
const SIGNALS_FILE: &str = "signals.json";
const PRINCIPLES_FILE: &str = "principles.json";
const AXIOMS_FILE: &str = "axioms.json";
const TMP_SUFFIX: &str = ".tmp";

// ============================================================
// Atomic JSON I/O
// ============================================================

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension(format!("json.{}{}", std::process::id(), TMP_SUFFIX))
}

/// Serialize to a synced sibling temp file. Returns the temp path.
fn stage_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = temp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(tmp)
}

fn commit_staged(tmp: &Path, path: &Path) -> Result<()> {
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(e.into());
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write via a sibling temp file and rename, so readers never see a partial document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = stage_json(path, value)?;
    commit_staged(&tmp, path)
}

/// Temp files awaiting rename. Whatever is still pending when dropped is removed.
#[derive(Default)]
struct StagedWrites {
    pending: Vec<(PathBuf, PathBuf)>,
}

impl StagedWrites {
    fn stage<T: Serialize + ?Sized>(&mut self, path: PathBuf, value: &T) -> Result<()> {
        let tmp = stage_json(&path, value)?;
        self.pending.push((tmp, path));
        Ok(())
    }

    /// Rename in staging order.
    fn commit(mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let (tmp, path) = self.pending.remove(0);
            commit_staged(&tmp, &path)?;
        }
        Ok(())
    }
}

impl Drop for StagedWrites {
    fn drop(&mut self) {
        for (tmp, _) in &self.pending {
            let _ = std::fs::remove_file(tmp);
        }
    }
}

/// Read a JSON document. Missing or unparseable files read as absent.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str::<T>(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to parse {}: {}, treating as absent", path.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, treating as absent", path.display(), e);
            None
        }
    }
}

/// Remove temp files left behind by a crashed writer. Returns how many were removed.
pub fn sweep_orphaned_temp_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(TMP_SUFFIX))
            .unwrap_or(false);
        if is_tmp && path.is_file() {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("Swept orphaned temp file {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to sweep {}: {}", path.display(), e),
            }
        }
    }
    removed
}

// ============================================================
// Lock
// ============================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Whether a process with this pid currently exists.
pub fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    if Path::new("/proc/self").exists() {
        return Path::new(&format!("/proc/{}", pid)).exists();
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// How long an unreadable lock file is given to be filled in by its creator.
pub const LOCK_WRITE_GRACE: Duration = Duration::from_secs(30);

fn file_age(path: &Path) -> Duration {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .unwrap_or(Duration::ZERO)
}

/// What the lock file currently says about its holder.
#[derive(Clone, Debug, PartialEq)]
enum LockHolder {
    Missing,
    Live(u32),
    Dead(u32),
    /// Empty or partial; the creator may still be writing it.
    Unreadable { age: Duration },
}

impl LockHolder {
    fn inspect(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return LockHolder::Missing,
            Err(_) => String::new(),
        };
        match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) if process_alive(info.pid) => LockHolder::Live(info.pid),
            Ok(info) => LockHolder::Dead(info.pid),
            Err(_) => LockHolder::Unreadable { age: file_age(path) },
        }
    }

    fn is_stale(&self) -> bool {
        match self {
            LockHolder::Dead(_) => true,
            LockHolder::Unreadable { age } => *age >= LOCK_WRITE_GRACE,
            LockHolder::Missing | LockHolder::Live(_) => false,
        }
    }

    fn pid(&self) -> u32 {
        match self {
            LockHolder::Live(pid) | LockHolder::Dead(pid) => *pid,
            LockHolder::Missing | LockHolder::Unreadable { .. } => 0,
        }
    }
}

/// Exclusive right to clear a stale lock. Removed when dropped.
struct RecoveryGuard {
    path: PathBuf,
}

impl RecoveryGuard {
    fn acquire(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(RECOVER_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let guard = Self { path };
                file.write_all(std::process::id().to_string().as_bytes())?;
                Ok(Some(guard))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RecoveryGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

/// Advisory single-writer lock. Released when dropped.
#[derive(Debug)]
pub struct SynthesisLock {
    path: PathBuf,
    info: LockInfo,
}

impl SynthesisLock {
    /// Acquire by atomic create. A lock whose holder is gone, or that stayed
    /// unreadable past [`LOCK_WRITE_GRACE`], is cleared by whichever contender
    /// takes the recovery guard; it re-checks the lock under the guard before
    /// removing it. Orphaned temp files are swept once held.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        if let Some(lock) = Self::try_create(dir, &path)? {
            return Ok(lock);
        }

        let holder = LockHolder::inspect(&path);
        if holder == LockHolder::Missing {
            // Released between our create and inspect.
            return Self::try_create(dir, &path)?.ok_or_else(|| Error::lock_contention(path.clone(), 0));
        }
        if !holder.is_stale() {
            return Err(Error::lock_contention(path, holder.pid()));
        }

        let Some(_guard) = RecoveryGuard::acquire(dir)? else {
            let guard_path = dir.join(RECOVER_FILE);
            if file_age(&guard_path) >= LOCK_WRITE_GRACE {
                warn!(
                    "Stale lock recovery is blocked by {}; remove it if no synthesis is running",
                    guard_path.display()
                );
            }
            return Err(Error::lock_contention(path, holder.pid()));
        };

        let holder = LockHolder::inspect(&path);
        match &holder {
            LockHolder::Missing => {}
            h if h.is_stale() => {
                warn!("Removing stale synthesis lock {} ({:?})", path.display(), h);
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            h => return Err(Error::lock_contention(path, h.pid())),
        }

        Self::try_create(dir, &path)?.ok_or_else(|| Error::lock_contention(path.clone(), 0))
    }

    /// `Ok(None)` when the lock file already exists.
    fn try_create(dir: &Path, path: &Path) -> Result<Option<Self>> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lock = Self {
            path: path.to_path_buf(),
            info: LockInfo {
                pid: std::process::id(),
                acquired_at: Utc::now(),
            },
        };
        // Dropping `lock` on error removes the half-written file.
        file.write_all(serde_json::to_string(&lock.info)?.as_bytes())?;
        file.sync_all()?;
        sweep_orphaned_temp_files(dir);
        debug!("Acquired synthesis lock {}", lock.path.display());
        Ok(Some(lock))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

impl Drop for SynthesisLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released synthesis lock {}", self.path.display()),
            Err(e) => warn!("Failed to release lock {}: {}", self.path.display(), e),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LockStatus {
    Free,
    Held { pid: u32, acquired_at: Option<DateTime<Utc>>, alive: bool },
}

// ============================================================
// Workspace state
// ============================================================

/// Per-workspace state directory.
#[derive(Clone, Debug)]
pub struct SoulStore {
    dir: PathBuf,
}

impl SoulStore {
    pub fn new(workspace: &Path) -> Self {
        Self { dir: workspace.join(STATE_DIR) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn soul_path(&self) -> PathBuf {
        self.dir.join(SOUL_FILE)
    }

    pub fn signals_path(&self) -> PathBuf {
        self.dir.join(SIGNALS_FILE)
    }

    pub fn principles_path(&self) -> PathBuf {
        self.dir.join(PRINCIPLES_FILE)
    }

    pub fn axioms_path(&self) -> PathBuf {
        self.dir.join(AXIOMS_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn lock(&self) -> Result<SynthesisLock> {
        SynthesisLock::acquire(&self.dir)
    }

    pub fn lock_status(&self) -> LockStatus {
        let path = self.lock_path();
        if !path.exists() {
            return LockStatus::Free;
        }
        match read_json::<LockInfo>(&path) {
            Some(info) => LockStatus::Held {
                pid: info.pid,
                acquired_at: Some(info.acquired_at),
                alive: process_alive(info.pid),
            },
            None => LockStatus::Held {
                pid: 0,
                acquired_at: None,
                alive: false,
            },
        }
    }

    /// Load and validate the soul. Invalid state reads as absent.
    pub fn load_soul(&self) -> Option<Soul> {
        let soul: Soul = read_json(&self.soul_path())?;
        match soul.validate() {
            Ok(()) => {
                info!(
                    "Loaded soul {} (cycle {}, {} principles, {} axioms)",
                    soul.id,
                    soul.cycle_count,
                    soul.principles.len(),
                    soul.axioms.len()
                );
                Some(soul)
            }
            Err(e) => {
                warn!("Ignoring invalid soul at {}: {}", self.soul_path().display(), e);
                None
            }
        }
    }

    pub fn save_soul(&self, soul: &Soul) -> Result<()> {
        write_json_atomic(&self.soul_path(), soul)
    }

    pub fn load_signals(&self) -> Vec<Signal> {
        read_json(&self.signals_path()).unwrap_or_default()
    }

    /// Merge `signals` into the stored set; existing ids keep their stored record.
    pub fn save_signals(&self, signals: &[Signal]) -> Result<usize> {
        let all = self.merged_signals(signals);
        write_json_atomic(&self.signals_path(), &all)?;
        Ok(all.len())
    }

    fn merged_signals(&self, signals: &[Signal]) -> Vec<Signal> {
        let mut all = self.load_signals();
        let mut seen: HashSet<String> = all.iter().map(|s| s.id.clone()).collect();
        for signal in signals {
            if seen.insert(signal.id.clone()) {
                all.push(signal.clone());
            }
        }
        all
    }

    /// Persist one finished run. Every document is staged before any is renamed,
    /// and the soul is renamed last. Returns the stored signal count.
    pub fn commit(
        &self,
        new_signals: &[Signal],
        compression: &CompressionResult,
        soul: &Soul,
    ) -> Result<usize> {
        let signals = self.merged_signals(new_signals);
        let mut staged = StagedWrites::default();
        staged.stage(self.signals_path(), &signals)?;
        staged.stage(self.principles_path(), &soul.principles)?;
        staged.stage(self.axioms_path(), compression)?;
        staged.stage(self.soul_path(), soul)?;
        staged.commit()?;
        Ok(signals.len())
    }

    pub fn load_axioms(&self) -> Option<CompressionResult> {
        read_json(&self.axioms_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn atomic_write_replaces_existing_document() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "[0]").unwrap();
        write_json_atomic(&path, &vec![4, 5]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().replace(char::is_whitespace, ""), "[4,5]");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn sweep_removes_only_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("soul.json.4242.tmp"), "{").unwrap();
        std::fs::write(dir.path().join("soul.json"), "{}").unwrap();
        assert_eq!(sweep_orphaned_temp_files(dir.path()), 1);
        assert!(dir.path().join("soul.json").exists());
    }

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }
}
