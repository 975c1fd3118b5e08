//! I2S microphone adapter
//!
//! Records mono audio with `arecord`, trims the first second (the PDM
//! front-end pops on power-up), and postprocesses with `ffmpeg` into VBR
//! MP3 (or amplified WAV when compression is off).
//!
//! Artifacts are named by their capture start time in UTC, with colons
//! replaced so the name is a valid filename everywhere. Postprocessing
//! encodes into the working directory and moves the result into the data
//! directory via a `.part` copy plus rename, so a file under the upload
//! tree is only ever visible complete under its final name.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use ecopod_core::domain::layout::PARTIAL_SUFFIX;
use ecopod_core::ports::capture::{CaptureArtifact, ICaptureSensor};

use crate::SensorError;

/// Name of the in-progress recording file under the working directory
const WORKING_FILE: &str = "currentlyRecording.wav";

/// Seconds trimmed from the start of each recording to remove popping
const REC_START_TRIM_SECS: u64 = 1;

// ============================================================================
// T151: Options
// ============================================================================

/// Options for the I2S microphone, deserialised from the sensor section
/// of the device configuration. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct I2sMicOptions {
    /// Length of one audio segment in seconds
    #[serde(default = "default_record_length")]
    pub record_length: u64,
    /// Sample rate in Hz
    #[serde(default = "default_record_freq")]
    pub record_freq: u32,
    /// Compress to VBR MP3 (false keeps amplified WAV)
    #[serde(default = "default_compress_data")]
    pub compress_data: bool,
    /// Amplification factor applied during postprocessing
    #[serde(default = "default_amplification")]
    pub amplification: u32,
    /// Pause between audio segments in seconds
    #[serde(default)]
    pub capture_delay: u64,
    /// ALSA card number (`arecord --list-devices`)
    #[serde(default)]
    pub capture_card: u32,
    /// Optional hardware init command run during setup (e.g. the
    /// PDM-to-I2S bridge's I2C bring-up script)
    #[serde(default)]
    pub init_command: Option<String>,
}

fn default_record_length() -> u64 {
    1200
}

fn default_record_freq() -> u32 {
    44100
}

fn default_compress_data() -> bool {
    true
}

fn default_amplification() -> u32 {
    5
}

impl Default for I2sMicOptions {
    fn default() -> Self {
        Self {
            record_length: default_record_length(),
            record_freq: default_record_freq(),
            compress_data: default_compress_data(),
            amplification: default_amplification(),
            capture_delay: 0,
            capture_card: 0,
            init_command: None,
        }
    }
}

// ============================================================================
// T152: I2sMic
// ============================================================================

/// Mono I2S microphone behind an `arecord`/`ffmpeg` pipeline
pub struct I2sMic {
    options: I2sMicOptions,
}

impl I2sMic {
    /// Registry name for this sensor
    pub const TYPE_NAME: &'static str = "I2SMic";

    /// Builds the sensor from the raw sensor options map.
    pub fn from_options(
        options: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, SensorError> {
        let options: I2sMicOptions =
            serde_json::from_value(serde_json::Value::Object(options.clone()))
                .map_err(SensorError::InvalidOptions)?;
        Ok(Self { options })
    }

    #[cfg(test)]
    fn with_options(options: I2sMicOptions) -> Self {
        Self { options }
    }
}

// ============================================================================
// T153: naming and command assembly
// ============================================================================

/// Builds the artifact base name from the effective start of audio
/// (capture start plus the trimmed second): ISO-8601 UTC to millisecond
/// precision, `Z`-suffixed, with `:` replaced for filename safety.
fn artifact_name(capture_start: DateTime<Utc>) -> String {
    let effective = capture_start + chrono::Duration::seconds(REC_START_TRIM_SECS as i64);
    effective.format("%Y-%m-%dT%H_%M_%S%.3fZ").to_string()
}

fn arecord_args(options: &I2sMicOptions, out: &Path) -> Vec<String> {
    vec![
        "--device".to_string(),
        format!("plughw:{},0", options.capture_card),
        "-c1".to_string(),
        "--rate".to_string(),
        options.record_freq.to_string(),
        "--format".to_string(),
        "S32_LE".to_string(),
        "--duration".to_string(),
        (options.record_length + REC_START_TRIM_SECS).to_string(),
        out.to_string_lossy().into_owned(),
    ]
}

fn trim_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "panic".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-ss".to_string(),
        REC_START_TRIM_SECS.to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

fn encode_args(options: &I2sMicOptions, input: &Path, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-loglevel".to_string(),
        "panic".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
    ];
    if options.compress_data {
        // VBR compression
        args.extend([
            "-codec:a".to_string(),
            "libmp3lame".to_string(),
            "-filter:a".to_string(),
            format!("volume={}", options.amplification),
            "-qscale:a".to_string(),
            "0".to_string(),
            "-ac".to_string(),
            "1".to_string(),
        ]);
    } else {
        args.extend([
            "-filter:a".to_string(),
            format!("volume={}", options.amplification),
        ]);
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Runs a command to completion, failing on a non-zero exit status.
async fn run_checked(program: &str, args: &[String]) -> Result<()> {
    debug!(program, ?args, "Running command");
    let status = tokio::process::Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("Failed to spawn {program}"))?;

    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

// ============================================================================
// T154: ICaptureSensor implementation
// ============================================================================

#[async_trait::async_trait]
impl ICaptureSensor for I2sMic {
    async fn setup(&self) -> Result<()> {
        // A recorder left running by a previous unclean shutdown holds the
        // capture device.
        let _ = tokio::process::Command::new("killall")
            .arg("arecord")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Some(init) = &self.options.init_command {
            run_checked("sh", &["-c".to_string(), init.clone()])
                .await
                .context("Sensor init command failed")?;
        }
        Ok(())
    }

    async fn capture(
        &self,
        working_dir: &Path,
        data_dir: &Path,
    ) -> Result<CaptureArtifact> {
        let start = Utc::now();
        let name = artifact_name(start);

        let wfile = working_dir.join(WORKING_FILE);
        let wfile_trimmed = working_dir.join(format!("trimmed_{WORKING_FILE}"));

        info!(
            artifact = %name,
            seconds = self.options.record_length,
            rate = self.options.record_freq,
            "Recording from I2S microphone"
        );
        run_checked("arecord", &arecord_args(&self.options, &wfile))
            .await
            .context("arecord failed")?;

        run_checked("ffmpeg", &trim_args(&wfile, &wfile_trimmed))
            .await
            .context("Trimming recording failed")?;
        tokio::fs::remove_file(&wfile)
            .await
            .context("Failed to remove untrimmed recording")?;

        let staged_path = working_dir.join(&name);
        tokio::fs::rename(&wfile_trimmed, &staged_path)
            .await
            .context("Failed to stage trimmed recording")?;

        info!(artifact = %name, "Finished recording");

        Ok(CaptureArtifact {
            name,
            staged_path,
            data_dir: data_dir.to_path_buf(),
        })
    }

    async fn postprocess(&self, artifact: CaptureArtifact) -> Result<()> {
        let extension = if self.options.compress_data { "mp3" } else { "wav" };
        let final_name = format!("{}.{extension}", artifact.name);

        // Encode next to the staged file, outside the upload tree.
        let encoded = artifact
            .staged_path
            .with_file_name(format!("{final_name}.enc"));

        info!(artifact = %artifact.name, compress = self.options.compress_data, "Postprocessing");
        run_checked(
            "ffmpeg",
            &encode_args(&self.options, &artifact.staged_path, &encoded),
        )
        .await
        .context("Encoding failed")?;

        // Copy into the data directory under a partial name, then rename:
        // the final name only ever appears with complete content.
        let partial = artifact
            .data_dir
            .join(format!("{final_name}{PARTIAL_SUFFIX}"));
        let final_path = artifact.data_dir.join(&final_name);

        tokio::fs::copy(&encoded, &partial)
            .await
            .context("Failed to copy encoded artifact to data directory")?;
        tokio::fs::rename(&partial, &final_path)
            .await
            .context("Failed to finalise artifact")?;

        for stale in [&encoded, &artifact.staged_path] {
            if let Err(e) = tokio::fs::remove_file(stale).await {
                warn!(path = %stale.display(), error = %e, "Could not remove staging file");
            }
        }

        info!(artifact = %artifact.name, path = %final_path.display(), "Artifact finalised");
        Ok(())
    }

    async fn rest(&self) {
        if self.options.capture_delay > 0 {
            debug!(
                seconds = self.options.capture_delay,
                "Sensor resting between captures"
            );
            tokio::time::sleep(Duration::from_secs(self.options.capture_delay)).await;
        }
    }

    fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.options.record_length + self.options.capture_delay)
    }
}

// ============================================================================
// Unit tests
// ============================================================================
