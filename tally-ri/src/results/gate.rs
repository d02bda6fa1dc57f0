//! Mutual-exclusion gate for results tables
//!
//! At most one read-merge-write cycle runs per table at a time. Two layers:
//!
//! 1. An in-process async mutex per table path queues writers from this
//!    process without burning their retry budget.
//! 2. A marker file `<table>.lock` serializes cooperating processes. The
//!    holder keeps an exclusive advisory lock (`fs2`) on the open marker and
//!    writes its token into it. A marker that can be locked but still carries
//!    a token was left by a holder that died; once older than `stale_after` it
//!    is cleared in place and the acquire retried at once. A live holder is
//!    never reclaimed, however long it holds the gate.
//!
//! The retry loop is the pure [`GateMachine`]; [`ResultsGate::acquire`] only
//! performs the I/O and sleeps it asks for.

use super::error::{ResultsError, ResultsResult};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tally_common::config::GateConfig;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

/// Retry and staleness limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Duration,
    pub stale_after: Duration,
}

impl GatePolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound on the time spent waiting for the gate
    pub fn max_wait(&self) -> Duration {
        self.backoff.saturating_mul(self.max_attempts())
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        GateConfig::default().into()
    }
}

impl From<GateConfig> for GatePolicy {
    fn from(config: GateConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            stale_after: Duration::from_millis(config.stale_after_ms),
        }
    }
}

/// What one attempt on the marker found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Marker locked and stamped with our token; we hold the gate
    Created,
    /// Marker locked by a live holder, or abandoned too recently to reclaim
    HeldFresh,
    /// Abandoned marker cleared, or the marker was replaced under us
    HeldStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Trying { attempt: u32 },
    BackingOff { attempt: u32 },
    Acquired,
    Failed { attempts: u32 },
}

/// Bounded-retry state machine: no I/O, no clocks
#[derive(Debug, Clone)]
pub struct GateMachine {
    policy: GatePolicy,
    state: GateState,
}

impl GateMachine {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            state: GateState::Trying { attempt: 1 },
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Feed the result of a probe made in `Trying`
    pub fn observe(&mut self, outcome: ProbeOutcome) -> GateState {
        if let GateState::Trying { attempt } = self.state {
            let exhausted = attempt >= self.policy.max_attempts();
            self.state = match outcome {
                ProbeOutcome::Created => GateState::Acquired,
                _ if exhausted => GateState::Failed { attempts: attempt },
                ProbeOutcome::HeldStale => GateState::Trying {
                    attempt: attempt + 1,
                },
                ProbeOutcome::HeldFresh => GateState::BackingOff { attempt },
            };
        }
        self.state
    }

    /// The backoff sleep requested in `BackingOff` has elapsed
    pub fn backoff_elapsed(&mut self) -> GateState {
        if let GateState::BackingOff { attempt } = self.state {
            self.state = GateState::Trying {
                attempt: attempt + 1,
            };
        }
        self.state
    }
}

/// Per-table gates shared by every clone
#[derive(Debug, Clone)]
pub struct ResultsGate {
    policy: GatePolicy,
    local: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ResultsGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            local: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Marker path for a table
    pub fn marker_path(table: &Path) -> PathBuf {
        let mut name = table
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        table.with_file_name(name)
    }

    fn local_mutex(&self, table: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(table.to_path_buf()).or_default().clone()
    }

    /// Acquire exclusive access to `table`
    ///
    /// Fails with [`ResultsError::LockTimeout`] once the retry budget is
    /// spent; never waits longer than roughly `policy.max_wait()` per layer.
    pub async fn acquire(&self, table: &Path) -> ResultsResult<GateGuard> {
        let table_name = table.display().to_string();

        let local = match tokio::time::timeout(
            self.policy.max_wait(),
            self.local_mutex(table).lock_owned(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                warn!(table = %table_name, "Results gate: in-process wait exceeded");
                return Err(ResultsError::LockTimeout {
                    table: table_name,
                    attempts: 0,
                });
            }
        };

        let marker = Self::marker_path(table);
        let token = Uuid::new_v4().to_string();
        let mut machine = GateMachine::new(self.policy);
        let mut held: Option<File> = None;

        loop {
            match machine.state() {
                GateState::Trying { attempt } => {
                    let (outcome, file) = {
                        let marker = marker.clone();
                        let token = token.clone();
                        let stale_after = self.policy.stale_after;
                        tokio::task::spawn_blocking(move || probe(&marker, &token, stale_after))
                            .await
                            .map_err(std::io::Error::other)??
                    };
                    if attempt > 1 {
                        debug!(table = %table_name, attempt, ?outcome, "Results gate retry");
                    }
                    held = file;
                    machine.observe(outcome);
                }
                GateState::BackingOff { .. } => {
                    tokio::time::sleep(self.policy.backoff).await;
                    machine.backoff_elapsed();
                }
                GateState::Acquired => {
                    return Ok(GateGuard {
                        marker,
                        token,
                        file: held,
                        _local: Some(local),
                    });
                }
                GateState::Failed { attempts } => {
                    warn!(
                        table = %table_name,
                        attempts,
                        max_wait_ms = self.policy.max_wait().as_millis() as u64,
                        "Results gate not acquired"
                    );
                    return Err(ResultsError::LockTimeout {
                        table: table_name,
                        attempts,
                    });
                }
            }
        }
    }
}

/// One attempt on the marker. Blocking; run off the async workers.
///
/// On `Created` the returned file holds the exclusive lock and must be kept
/// open for as long as the gate is held.
fn probe(
    marker: &Path,
    token: &str,
    stale_after: Duration,
) -> std::io::Result<(ProbeOutcome, Option<File>)> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(marker)?;

    if let Err(e) = file.try_lock_exclusive() {
        if e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            || e.kind() == ErrorKind::WouldBlock
        {
            return Ok((ProbeOutcome::HeldFresh, None));
        }
        return Err(e);
    }

    // Lock held from here on; dropping `file` releases it
    let mut previous = String::new();
    file.read_to_string(&mut previous)?;

    if !previous.trim().is_empty() {
        let age = file
            .metadata()?
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < stale_after {
            return Ok((ProbeOutcome::HeldFresh, None));
        }

        warn!(
            marker = %marker.display(),
            age_ms = age.as_millis() as u64,
            previous_holder = previous.lines().next().unwrap_or_default(),
            "Reclaiming stale results lock"
        );
        file.set_len(0)?;
        return Ok((ProbeOutcome::HeldStale, None));
    }

    let stamped = stamp(&mut file, token);
    if let Err(e) = stamped {
        // Leave the marker empty so the next contender can take it
        let _ = file.set_len(0);
        return Err(e);
    }

    // A holder releasing between our open and our lock unlinks the file we
    // locked; only the marker currently at the path counts
    match std::fs::read_to_string(marker) {
        Ok(content) if owned_by(&content, token) => Ok((ProbeOutcome::Created, Some(file))),
        Ok(_) => Ok((ProbeOutcome::HeldStale, None)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok((ProbeOutcome::HeldStale, None)),
        Err(e) => Err(e),
    }
}

fn stamp(file: &mut File, token: &str) -> std::io::Result<()> {
    let content = format!(
        "{}\npid={}\nacquired={}\n",
        token,
        std::process::id(),
        tally_common::time::now().to_rfc3339()
    );
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(content.as_bytes())?;
    file.sync_data()
}

/// Clear and remove our marker, then drop the lock. Blocking.
fn release_marker(marker: &Path, token: &str, file: File) {
    match std::fs::read_to_string(marker) {
        Ok(content) if owned_by(&content, token) => {
            // Emptied first: anyone who opened the old file before the unlink
            // finds nothing to inherit
            if let Err(e) = file.set_len(0) {
                warn!(marker = %marker.display(), error = %e, "Failed to clear results lock");
            }
            if let Err(e) = std::fs::remove_file(marker) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(marker = %marker.display(), error = %e, "Failed to remove results lock");
                }
            }
        }
        Ok(_) => debug!(marker = %marker.display(), "Results lock replaced by another holder"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(marker = %marker.display(), error = %e, "Failed to read results lock"),
    }
    let _ = FileExt::unlock(&file);
}

/// Held gate. Release with [`GateGuard::release`].
///
/// Dropping an unreleased guard (e.g. a cancelled request future) releases
/// synchronously on the current thread as a fallback.
#[derive(Debug)]
pub struct GateGuard {
    marker: PathBuf,
    token: String,
    file: Option<File>,
    _local: Option<OwnedMutexGuard<()>>,
}

impl GateGuard {
    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Best-effort marker removal. A marker already gone, or replaced by
    /// another holder, is not an error. Calling this more than once is a no-op.
    pub async fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let marker = self.marker.clone();
            let token = self.token.clone();
            if let Err(e) =
                tokio::task::spawn_blocking(move || release_marker(&marker, &token, file)).await
            {
                warn!(marker = %self.marker.display(), error = %e, "Results lock release task failed");
            }
        }
        self._local = None;
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            release_marker(&self.marker, &self.token, file);
        }
    }
}

fn owned_by(content: &str, token: &str) -> bool {
    content.lines().next() == Some(token)
}
