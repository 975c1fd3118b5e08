//! Capture sensor port (driven/secondary port)
//!
//! Interface to whatever physically senses the environment. The primary
//! implementation is an I2S microphone, but the trait is sensor-agnostic:
//! the engine only needs capture/postprocess/rest semantics plus the
//! sensor's own sync cadence.
//!
//! ## Design Notes
//!
//! - `capture` and `postprocess` are separate so the supervisor can hand
//!   postprocessing off as an independent unit of work; capture of the
//!   next artifact must never wait for compression of the previous one.
//! - Ownership of a [`CaptureArtifact`] transfers at handoff; the value is
//!   consumed by `postprocess` and ceases to exist once the finished file
//!   appears under `data_dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// T031: CaptureArtifact
// ============================================================================

/// One unit of sensed data in flight between capture and postprocessing
///
/// The staged file lives under the working directory until postprocessing
/// writes the finished artifact into `data_dir` and removes the staging
/// copy. A file under `data_dir` is only ever visible complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureArtifact {
    /// Timestamp-derived base name (no extension)
    pub name: String,
    /// Raw captured file awaiting postprocessing
    pub staged_path: PathBuf,
    /// Destination directory for the finished artifact
    pub data_dir: PathBuf,
}

// ============================================================================
// T032: ICaptureSensor trait
// ============================================================================

/// Port trait for the capture capability
#[async_trait::async_trait]
pub trait ICaptureSensor: Send + Sync {
    /// One-time hardware initialisation. Failure is boot-fatal: a pod that
    /// cannot record safely must not start.
    async fn setup(&self) -> anyhow::Result<()>;

    /// Produces one artifact. Raw data is written under `working_dir`;
    /// `data_dir` is recorded on the artifact for postprocessing.
    async fn capture(&self, working_dir: &Path, data_dir: &Path)
        -> anyhow::Result<CaptureArtifact>;

    /// Finalises an artifact: encodes/compresses it into its `data_dir`
    /// under its final name and removes the staged file. The finished file
    /// must only appear under `data_dir` on completion.
    async fn postprocess(&self, artifact: CaptureArtifact) -> anyhow::Result<()>;

    /// The sensor's own inter-cycle rest. Called between capture cycles.
    async fn rest(&self);

    /// Interval between sync cycles, derived from the capture cadence so
    /// uploads interleave with recordings instead of contending.
    fn sync_interval(&self) -> Duration;
}
