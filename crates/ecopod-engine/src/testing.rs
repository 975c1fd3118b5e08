//! In-memory port doubles shared by the engine unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ecopod_core::config::MobileNetworkConfig;
use ecopod_core::domain::newtypes::{DeviceId, ObjectKey};
use ecopod_core::ports::capture::{CaptureArtifact, ICaptureSensor};
use ecopod_core::ports::indicator::{IIndicator, LedState, StatusGroup};
use ecopod_core::ports::modem::IModemControl;
use ecopod_core::ports::remote_store::IRemoteStore;
use ecopod_core::ports::removable_storage::IRemovableStorage;
use ecopod_core::ports::system::ISystemControl;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Modem
// ============================================================================

#[derive(Default)]
pub struct MockModem {
    pub enable_line: AtomicBool,
    pub pulses: AtomicU32,
    pub enumerates: AtomicBool,
    pub apn_profiles: Mutex<Vec<MobileNetworkConfig>>,
}

impl MockModem {
    pub fn with_modem_present() -> Self {
        let modem = Self::default();
        modem.enumerates.store(true, Ordering::SeqCst);
        modem
    }
}

#[async_trait::async_trait]
impl IModemControl for MockModem {
    async fn set_enable_line(&self, enabled: bool) -> anyhow::Result<()> {
        self.enable_line.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn pulse_power_on_line(&self) -> anyhow::Result<()> {
        self.pulses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_enumerated(&self) -> bool {
        self.enumerates.load(Ordering::SeqCst)
    }

    async fn configure_apn(&self, profile: &MobileNetworkConfig) -> anyhow::Result<()> {
        self.apn_profiles.lock().unwrap().push(profile.clone());
        Ok(())
    }
}

// ============================================================================
// System
// ============================================================================

pub struct MockSystem {
    pub uptime_secs: AtomicU64,
    pub clock_syncs: AtomicU32,
    pub reboots: AtomicU32,
    pub fail_device_id: AtomicBool,
}

impl Default for MockSystem {
    fn default() -> Self {
        Self {
            uptime_secs: AtomicU64::new(60),
            clock_syncs: AtomicU32::new(0),
            reboots: AtomicU32::new(0),
            fail_device_id: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl ISystemControl for MockSystem {
    fn device_id(&self) -> anyhow::Result<DeviceId> {
        if self.fail_device_id.load(Ordering::SeqCst) {
            anyhow::bail!("no serial in /proc/cpuinfo");
        }
        Ok(DeviceId::new("RPiID-test01").unwrap())
    }

    fn uptime(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_secs(self.uptime_secs.load(Ordering::SeqCst)))
    }

    async fn sync_clock(&self) -> anyhow::Result<()> {
        self.clock_syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reboot(&self) -> anyhow::Result<()> {
        self.reboots.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Indicator
// ============================================================================

#[derive(Default)]
pub struct RecordingIndicator {
    pub states: Mutex<Vec<(StatusGroup, LedState)>>,
}

impl RecordingIndicator {
    pub fn last(&self, group: StatusGroup) -> Option<LedState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(g, _)| *g == group)
            .map(|(_, s)| *s)
    }

    pub fn history(&self, group: StatusGroup) -> Vec<LedState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl IIndicator for RecordingIndicator {
    fn set_state(&self, group: StatusGroup, state: LedState) {
        self.states.lock().unwrap().push((group, state));
    }
}

// ============================================================================
// Remote store
// ============================================================================

#[derive(Default)]
pub struct MockStore {
    pub uploaded: Mutex<Vec<ObjectKey>>,
    /// Keys containing any of these substrings fail to upload.
    pub fail_substrings: Vec<String>,
}

impl MockStore {
    pub fn failing_on(substring: &str) -> Self {
        Self {
            uploaded: Mutex::new(Vec::new()),
            fail_substrings: vec![substring.to_string()],
        }
    }
}

#[async_trait::async_trait]
impl IRemoteStore for MockStore {
    async fn upload(&self, _local_path: &Path, key: &ObjectKey) -> anyhow::Result<()> {
        if self
            .fail_substrings
            .iter()
            .any(|s| key.as_str().contains(s.as_str()))
        {
            anyhow::bail!("simulated upload failure for {key}");
        }
        self.uploaded.lock().unwrap().push(key.clone());
        Ok(())
    }
}

// ============================================================================
// Removable storage
// ============================================================================

pub struct MockRemovableStorage {
    pub root: Option<PathBuf>,
    pub fail_verify: bool,
}

impl MockRemovableStorage {
    pub fn mounted_at(root: PathBuf) -> Self {
        Self {
            root: Some(root),
            fail_verify: false,
        }
    }

    pub fn absent() -> Self {
        Self {
            root: None,
            fail_verify: false,
        }
    }
}

#[async_trait::async_trait]
impl IRemovableStorage for MockRemovableStorage {
    async fn mount(&self) -> anyhow::Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => anyhow::bail!("could not mount external SD card"),
        }
    }

    async fn verify_writable(&self, _root: &Path) -> anyhow::Result<()> {
        if self.fail_verify {
            anyhow::bail!("write probe failed");
        }
        Ok(())
    }
}

// ============================================================================
// Capture sensor
// ============================================================================

pub struct MockSensor {
    pub interval: Duration,
    pub captures: AtomicU32,
    pub postprocessed: Mutex<Vec<String>>,
    /// Postprocessed count observed at the start of each capture, for
    /// asserting the handoff never blocks the next cycle.
    pub backlog_at_capture: Mutex<Vec<usize>>,
    pub postprocess_delay: Duration,
    pub fail_capture: AtomicBool,
    pub fail_setup: AtomicBool,
    /// Cancelled after this many captures, if set. Lets loop tests stop
    /// the supervisor from inside a cycle.
    pub cancel_after: Option<(u32, CancellationToken)>,
}

impl Default for MockSensor {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            captures: AtomicU32::new(0),
            postprocessed: Mutex::new(Vec::new()),
            backlog_at_capture: Mutex::new(Vec::new()),
            postprocess_delay: Duration::ZERO,
            fail_capture: AtomicBool::new(false),
            fail_setup: AtomicBool::new(false),
            cancel_after: None,
        }
    }
}

#[async_trait::async_trait]
impl ICaptureSensor for MockSensor {
    async fn setup(&self) -> anyhow::Result<()> {
        if self.fail_setup.load(Ordering::SeqCst) {
            anyhow::bail!("sensor hardware absent");
        }
        Ok(())
    }

    async fn capture(
        &self,
        working_dir: &Path,
        data_dir: &Path,
    ) -> anyhow::Result<CaptureArtifact> {
        if self.fail_capture.load(Ordering::SeqCst) {
            anyhow::bail!("capture device error");
        }

        self.backlog_at_capture
            .lock()
            .unwrap()
            .push(self.postprocessed.lock().unwrap().len());

        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if n >= *limit {
                token.cancel();
            }
        }

        let name = format!("artifact-{n:04}");
        let staged_path = working_dir.join(&name);
        tokio::fs::write(&staged_path, b"raw").await?;

        Ok(CaptureArtifact {
            name,
            staged_path,
            data_dir: data_dir.to_path_buf(),
        })
    }

    async fn postprocess(&self, artifact: CaptureArtifact) -> anyhow::Result<()> {
        if !self.postprocess_delay.is_zero() {
            tokio::time::sleep(self.postprocess_delay).await;
        }
        let final_path = artifact.data_dir.join(format!("{}.mp3", artifact.name));
        tokio::fs::write(&final_path, b"encoded").await?;
        let _ = tokio::fs::remove_file(&artifact.staged_path).await;
        self.postprocessed.lock().unwrap().push(artifact.name);
        Ok(())
    }

    async fn rest(&self) {
        // No inter-cycle delay in tests.
    }

    fn sync_interval(&self) -> Duration {
        self.interval
    }
}
