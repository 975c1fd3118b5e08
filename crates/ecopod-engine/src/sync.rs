//! Sync supervisor
//!
//! The perpetual connect→enumerate→upload→delete→disconnect loop. Runs
//! once per sync interval (the sensor's own cadence, so uploads interleave
//! with recordings); the first cycle is deliberately offset by half the
//! interval so it lands mid-way through the first recording.
//!
//! Delivery contract: a local file is deleted immediately after a
//! successful upload acknowledgment, and only then. A failed upload leaves
//! the file untouched for the next cycle - at-least-once delivery, never
//! data loss on transmit failure. The first failure aborts the rest of the
//! walk for this cycle without escalating; a single bad network event must
//! not kill the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ecopod_core::domain::cycle::SyncCycle;
use ecopod_core::domain::layout::PARTIAL_SUFFIX;
use ecopod_core::domain::newtypes::ObjectKey;
use ecopod_core::domain::runtime::DeviceRuntimeState;
use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::remote_store::IRemoteStore;

use crate::connectivity::ConnectivityController;

// ============================================================================
// T131: SyncSupervisor
// ============================================================================

/// Runs interval-paced sync cycles until shutdown
pub struct SyncSupervisor {
    store: Arc<dyn IRemoteStore>,
    /// Owned, not shared: after boot this supervisor is the only actor
    /// allowed to drive the modem.
    connectivity: ConnectivityController,
    indicator: Arc<dyn IIndicator>,
    runtime: Arc<DeviceRuntimeState>,
    upload_dir: PathBuf,
    interval: Duration,
    connect_retries: u32,
    shutdown: CancellationToken,
}

impl SyncSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn IRemoteStore>,
        connectivity: ConnectivityController,
        indicator: Arc<dyn IIndicator>,
        runtime: Arc<DeviceRuntimeState>,
        upload_dir: PathBuf,
        interval: Duration,
        connect_retries: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            connectivity,
            indicator,
            runtime,
            upload_dir,
            interval,
            connect_retries,
            shutdown,
        }
    }

    // ========================================================================
    // T132: run loop
    // ========================================================================

    /// Runs cycles until the shutdown signal is observed at a cycle
    /// boundary. Upload errors never escape a cycle, so this only returns
    /// early on shutdown.
    pub async fn run(self) -> Result<()> {
        let start = Instant::now();
        info!(
            interval_secs = self.interval.as_secs(),
            "Sync supervisor started"
        );

        // Status check for the LED, then power down and wait half an
        // interval so the first upload lands mid-recording.
        let reachable = self.connectivity.check_connection().await;
        self.runtime.set_connected(reachable);
        self.connectivity.disable().await;

        let offset = first_cycle_offset(self.interval, start.elapsed());
        info!(
            offset_secs = offset.as_secs(),
            "Sleeping until first sync cycle"
        );
        if self.sleep_or_shutdown(offset).await {
            info!("Sync supervisor stopped before first cycle");
            return Ok(());
        }

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let started = Instant::now();
            let cycle = self.run_cycle().await;
            info!(
                cycle = %cycle.id,
                connected = cycle.connected,
                attempted = cycle.files_attempted,
                uploaded = cycle.files_uploaded,
                failed = cycle.files_failed,
                "Sync cycle completed"
            );

            let wait = remaining_sleep(self.interval, started.elapsed());
            debug!(wait_secs = wait.as_secs(), "Waiting until next sync cycle");
            if self.sleep_or_shutdown(wait).await {
                break;
            }
        }

        info!("Sync supervisor stopped");
        Ok(())
    }

    /// Sleeps for `duration` unless shutdown arrives first. Returns true
    /// if shutdown was observed.
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.cancelled() => true,
        }
    }

    // ========================================================================
    // T133: one cycle
    // ========================================================================

    /// One connect→upload→disconnect iteration. Never fails: upload
    /// errors abort the remainder of the walk and are recorded on the
    /// returned [`SyncCycle`].
    pub(crate) async fn run_cycle(&self) -> SyncCycle {
        let mut cycle = SyncCycle::begin();

        let outcome = self.connectivity.ensure_connected(self.connect_retries).await;
        cycle.connected = outcome.is_connected();
        self.runtime.set_connected(cycle.connected);

        if cycle.connected {
            info!(
                cycle = %cycle.id,
                upload_dir = %self.upload_dir.display(),
                "Starting upload pass"
            );
            self.indicator
                .set_state(StatusGroup::Data, LedState::UPLOADING);

            if let Err(e) = self.upload_pending(&mut cycle).await {
                // Best-effort per cycle: whatever is left stays on disk
                // for the next cycle.
                warn!(
                    cycle = %cycle.id,
                    error = format!("{e:#}"),
                    "Upload pass aborted"
                );
            }

            self.indicator
                .set_state(StatusGroup::Data, LedState::CONNECTED);
        } else {
            info!(cycle = %cycle.id, "No internet connection, skipping upload pass");
        }

        self.connectivity.disable().await;
        cycle
    }

    /// Walks the upload tree and uploads every file, deleting each local
    /// file only after its upload succeeds. Returns at the first failure.
    pub(crate) async fn upload_pending(&self, cycle: &mut SyncCycle) -> Result<()> {
        let mut files = Vec::new();
        collect_files(&self.upload_dir, &mut files).await?;

        for local_path in files {
            let relative = local_path
                .strip_prefix(&self.upload_dir)
                .context("Upload walk escaped the upload root")?;
            let key = ObjectKey::from_relative_path(relative)
                .context("File name does not form a valid object key")?;

            cycle.files_attempted += 1;
            debug!(file = %local_path.display(), key = %key, "Uploading");

            if let Err(e) = self.store.upload(&local_path, &key).await {
                cycle.record_failure();
                return Err(e).with_context(|| format!("Upload failed for {key}"));
            }

            // Acknowledged by the store; only now is deletion safe.
            tokio::fs::remove_file(&local_path)
                .await
                .with_context(|| format!("Failed to delete uploaded file {key}"))?;
            cycle.record_upload();
        }

        Ok(())
    }
}

// ============================================================================
// T134: Interval arithmetic
// ============================================================================

/// Offset before the first cycle: half the interval, less time already
/// spent, floored at zero.
fn first_cycle_offset(interval: Duration, elapsed: Duration) -> Duration {
    (interval / 2).saturating_sub(elapsed)
}

/// Sleep to the next cycle boundary: the interval less this cycle's
/// elapsed time, floored at zero (a slow cycle starts the next one
/// immediately, it does not shift the cadence into arrears).
fn remaining_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Depth-first file enumeration under `dir`, sorted within each directory
/// for deterministic walk order. No ordering is guaranteed (or needed)
/// across directories. Files still being finalised (`.part`) are not yet
/// artifacts and are skipped.
fn collect_files<'a>(
    dir: &'a Path,
    out: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            children.push((entry.path(), entry.metadata().await?.is_dir()));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, is_dir) in children {
            if is_dir {
                collect_files_into(&path, out).await?;
            } else if path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX))
            {
                debug!(file = %path.display(), "Skipping in-flight partial file");
            } else {
                out.push(path);
            }
        }
        Ok(())
    })
}

async fn collect_files_into(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    collect_files(dir, out).await
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use ecopod_core::domain::mode::DeviceMode;

    use crate::connectivity::{ConnectivityController, ConnectivitySettings};
    use crate::storage;
    use crate::testing::{MockModem, MockStore, MockSystem, RecordingIndicator};

    use super::*;

    struct Fixture {
        supervisor: SyncSupervisor,
        modem: Arc<MockModem>,
        store: Arc<MockStore>,
        indicator: Arc<RecordingIndicator>,
        runtime: Arc<DeviceRuntimeState>,
    }

    fn fixture(upload_dir: PathBuf, modem: MockModem, store: MockStore) -> Fixture {
        let modem = Arc::new(modem);
        let store = Arc::new(store);
        let indicator = Arc::new(RecordingIndicator::default());
        let runtime = Arc::new(DeviceRuntimeState::new(DeviceMode::Online));
        let system = Arc::new(MockSystem::default());

        let settings = ConnectivitySettings {
            probe_url: "http://127.0.0.1:1/".to_string(),
            probe_timeout: Duration::from_millis(200),
            probe_retry_delay: Duration::from_millis(5),
            enable_settle: Duration::from_millis(1),
            enumeration_tries: 2,
            enumeration_delay: Duration::from_millis(5),
        };
        let connectivity = ConnectivityController::new(
            Arc::clone(&modem) as _,
            system,
            Arc::clone(&indicator) as _,
            settings,
        );

        let supervisor = SyncSupervisor::new(
            Arc::clone(&store) as _,
            connectivity,
            Arc::clone(&indicator) as _,
            Arc::clone(&runtime),
            upload_dir,
            Duration::from_secs(600),
            2,
            CancellationToken::new(),
        );

        Fixture {
            supervisor,
            modem,
            store,
            indicator,
            runtime,
        }
    }

    fn seed_tree(upload_dir: &Path) {
        std::fs::create_dir_all(upload_dir.join("proj_p1/pod_d1/conf_c1/alpha")).unwrap();
        std::fs::create_dir_all(upload_dir.join("proj_p1/pod_d1/conf_c1/beta")).unwrap();
        std::fs::write(
            upload_dir.join("proj_p1/pod_d1/conf_c1/alpha/a.mp3"),
            b"aaaa",
        )
        .unwrap();
        std::fs::write(upload_dir.join("proj_p1/pod_d1/conf_c1/beta/b.mp3"), b"bbbb").unwrap();
    }

    #[tokio::test]
    async fn uploads_then_deletes_each_file() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        seed_tree(&upload_dir);

        let fx = fixture(upload_dir.clone(), MockModem::default(), MockStore::default());
        let mut cycle = SyncCycle::begin();
        fx.supervisor.upload_pending(&mut cycle).await.unwrap();

        assert_eq!(cycle.files_attempted, 2);
        assert_eq!(cycle.files_uploaded, 2);
        assert_eq!(cycle.files_failed, 0);
        assert!(!upload_dir.join("proj_p1/pod_d1/conf_c1/alpha/a.mp3").exists());
        assert!(!upload_dir.join("proj_p1/pod_d1/conf_c1/beta/b.mp3").exists());

        let keys: Vec<String> = fx
            .store
            .uploaded
            .lock()
            .unwrap()
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "proj_p1/pod_d1/conf_c1/alpha/a.mp3",
                "proj_p1/pod_d1/conf_c1/beta/b.mp3",
            ]
        );
    }

    #[tokio::test]
    async fn in_flight_partial_files_are_not_uploaded() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        seed_tree(&upload_dir);
        std::fs::write(
            upload_dir.join("proj_p1/pod_d1/conf_c1/alpha/d.mp3.part"),
            b"partial",
        )
        .unwrap();

        let fx = fixture(upload_dir.clone(), MockModem::default(), MockStore::default());
        let mut cycle = SyncCycle::begin();
        fx.supervisor.upload_pending(&mut cycle).await.unwrap();

        assert_eq!(cycle.files_attempted, 2);
        assert!(upload_dir
            .join("proj_p1/pod_d1/conf_c1/alpha/d.mp3.part")
            .exists());
        assert!(fx
            .store
            .uploaded
            .lock()
            .unwrap()
            .iter()
            .all(|k| !k.as_str().contains(".part")));
    }

    #[tokio::test]
    async fn failed_upload_keeps_file_and_aborts_walk() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        seed_tree(&upload_dir);
        std::fs::write(upload_dir.join("proj_p1/pod_d1/conf_c1/beta/c.mp3"), b"cccc").unwrap();

        let fx = fixture(
            upload_dir.clone(),
            MockModem::default(),
            MockStore::failing_on("b.mp3"),
        );
        let mut cycle = SyncCycle::begin();
        let result = fx.supervisor.upload_pending(&mut cycle).await;

        assert!(result.is_err());
        // a.mp3 uploaded and deleted before the failure.
        assert!(!upload_dir.join("proj_p1/pod_d1/conf_c1/alpha/a.mp3").exists());
        // b.mp3 failed: still on disk, byte-identical.
        assert_eq!(
            std::fs::read(upload_dir.join("proj_p1/pod_d1/conf_c1/beta/b.mp3")).unwrap(),
            b"bbbb"
        );
        // c.mp3 never attempted: walk aborted.
        assert!(upload_dir.join("proj_p1/pod_d1/conf_c1/beta/c.mp3").exists());
        assert_eq!(cycle.files_attempted, 2);
        assert_eq!(cycle.files_uploaded, 1);
        assert_eq!(cycle.files_failed, 1);
    }

    #[tokio::test]
    async fn emptied_directory_survives_until_next_reconcile() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        seed_tree(&upload_dir);

        let fx = fixture(
            upload_dir.clone(),
            MockModem::default(),
            MockStore::failing_on("b.mp3"),
        );
        let mut cycle = SyncCycle::begin();
        let _ = fx.supervisor.upload_pending(&mut cycle).await;

        // alpha/ is now an empty husk, but reclaiming it is reconcile's
        // job, not the sync cycle's.
        let alpha = upload_dir.join("proj_p1/pod_d1/conf_c1/alpha");
        assert!(alpha.exists());

        let layout = ecopod_core::domain::layout::DirectoryLayout {
            working_dir: tmp.path().join("tmp"),
            upload_dir: upload_dir.clone(),
            data_dir: upload_dir.join("proj_p1/pod_d1/conf_c1"),
        };
        storage::reconcile(&layout).await.unwrap();

        assert!(!alpha.exists());
        assert!(upload_dir.join("proj_p1/pod_d1/conf_c1/beta/b.mp3").exists());
    }

    #[tokio::test]
    async fn disconnected_cycle_skips_uploads_but_still_disables_modem() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        seed_tree(&upload_dir);

        // Modem never enumerates: cycle must not touch a single file.
        let fx = fixture(upload_dir.clone(), MockModem::default(), MockStore::default());
        let cycle = fx.supervisor.run_cycle().await;

        assert!(!cycle.connected);
        assert_eq!(cycle.files_attempted, 0);
        assert!(upload_dir.join("proj_p1/pod_d1/conf_c1/alpha/a.mp3").exists());
        assert!(fx.store.uploaded.lock().unwrap().is_empty());
        assert!(!fx.modem.enable_line.load(Ordering::SeqCst), "modem off");
        assert!(!fx.runtime.is_connected());
    }

    #[tokio::test]
    async fn run_exits_promptly_on_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let upload_dir = tmp.path().join("captures");
        std::fs::create_dir_all(&upload_dir).unwrap();

        let fx = fixture(upload_dir, MockModem::default(), MockStore::default());
        let token = fx.supervisor.shutdown.clone();
        let indicator = Arc::clone(&fx.indicator);

        let handle = tokio::spawn(fx.supervisor.run());
        // Let the pre-offset status check run, then request shutdown.
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("supervisor should stop at the cycle boundary")
            .unwrap()
            .unwrap();

        // The pre-offset probe ran and recorded a connectivity verdict.
        assert!(indicator.last(StatusGroup::Data).is_some());
    }

    #[test]
    fn first_cycle_offset_is_half_interval_less_elapsed() {
        let interval = Duration::from_secs(600);
        assert_eq!(
            first_cycle_offset(interval, Duration::ZERO),
            Duration::from_secs(300)
        );
        assert_eq!(
            first_cycle_offset(interval, Duration::from_secs(20)),
            Duration::from_secs(280)
        );
        assert_eq!(
            first_cycle_offset(interval, Duration::from_secs(400)),
            Duration::ZERO
        );
    }

    #[test]
    fn remaining_sleep_floors_at_zero() {
        let interval = Duration::from_secs(600);
        assert_eq!(
            remaining_sleep(interval, Duration::from_secs(30)),
            Duration::from_secs(570)
        );
        assert_eq!(
            remaining_sleep(interval, Duration::from_secs(900)),
            Duration::ZERO
        );
    }
}
