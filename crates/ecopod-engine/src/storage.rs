//! Directory lifecycle management
//!
//! The filesystem tree under the upload root is the only resource shared
//! between the capture and sync workers: postprocessing appends finished
//! files, the sync worker deletes them after transmission. This module
//! owns the boot-time transitions of that tree:
//!
//! - [`reconcile`] wipes scratch space, reclaims the empty directory husks
//!   synchronisation leaves behind, and (re)creates the canonical dirs.
//! - [`merge_local_fallback`] folds data captured to local storage during
//!   a cardless run back into the canonical tree once a card is present.
//! - [`stage_previous_logs`] moves earlier run logs into the upload tree
//!   so they get transmitted with the data.
//!
//! All operations are idempotent; `reconcile` in particular is safe to run
//! repeatedly with no intervening writes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use ecopod_core::domain::layout::{DirectoryLayout, PARTIAL_SUFFIX};

// ============================================================================
// T101: reconcile()
// ============================================================================

/// Brings the directory tree to the canonical boot state.
///
/// 1. Deletes `working_dir` entirely - anything left there from a prior
///    unclean shutdown is unrecoverable scratch - and recreates it empty.
/// 2. Removes `.part` files an unclean shutdown left mid-finalisation.
/// 3. Walks `upload_dir` bottom-up, deleting every empty directory.
/// 4. Creates `upload_dir` and `data_dir` if absent.
pub async fn reconcile(layout: &DirectoryLayout) -> Result<()> {
    if tokio::fs::metadata(&layout.working_dir).await.is_ok() {
        info!(path = %layout.working_dir.display(), "Cleaning working directory");
        tokio::fs::remove_dir_all(&layout.working_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to remove working directory {}",
                    layout.working_dir.display()
                )
            })?;
    }

    remove_stale_partials(&layout.upload_dir).await?;
    prune_empty_dirs(&layout.upload_dir).await?;

    for dir in [&layout.working_dir, &layout.upload_dir, &layout.data_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    debug!(
        working = %layout.working_dir.display(),
        upload = %layout.upload_dir.display(),
        data = %layout.data_dir.display(),
        "Directory tree reconciled"
    );

    Ok(())
}

/// Removes `.part` files under `root`. A partial file is a finalisation
/// that never completed; its producer is gone and the bytes are
/// unrecoverable scratch, like the working directory.
async fn remove_stale_partials(root: &Path) -> Result<()> {
    if tokio::fs::metadata(root).await.is_err() {
        return Ok(());
    }

    let mut dirs = vec![root.to_path_buf()];
    collect_dirs(root, &mut dirs).await?;

    for dir in &dirs {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if entry.metadata().await?.is_file()
                && name.to_string_lossy().ends_with(PARTIAL_SUFFIX)
            {
                warn!(path = %entry.path().display(), "Removing stale partial file");
                tokio::fs::remove_file(entry.path())
                    .await
                    .with_context(|| format!("Failed to remove {}", entry.path().display()))?;
            }
        }
    }

    Ok(())
}

/// Removes empty directories under (and including) `root`, deepest first.
///
/// Artifacts already synchronised leave empty husks behind; letting them
/// accumulate would make the upload walk scale with history instead of
/// pending work.
async fn prune_empty_dirs(root: &Path) -> Result<()> {
    if tokio::fs::metadata(root).await.is_err() {
        return Ok(());
    }

    let mut dirs = vec![root.to_path_buf()];
    collect_dirs(root, &mut dirs).await?;

    // `collect_dirs` appends parents before children; reversing yields a
    // bottom-up order so a parent emptied by its children's removal is
    // itself removed in the same pass.
    for dir in dirs.iter().rev() {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entries.next_entry().await?.is_none() {
            info!(path = %dir.display(), "Removing empty upload directory");
            tokio::fs::remove_dir(dir)
                .await
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
    }

    Ok(())
}

/// Recursively collects every subdirectory of `dir`, parents first.
fn collect_dirs<'a>(
    dir: &'a Path,
    out: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.metadata().await?.is_dir() {
                let path = entry.path();
                out.push(path.clone());
                collect_dirs_into(&path, out).await?;
            }
        }
        Ok(())
    })
}

async fn collect_dirs_into(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    collect_dirs(dir, out).await
}

// ============================================================================
// T102: merge_local_fallback()
// ============================================================================

/// Merges a local fallback upload tree into the canonical one.
///
/// Used when data was written to local storage during a prior cardless
/// run and removable storage is available again. Destination files with
/// the same name are overwritten; the source tree is deleted afterwards.
/// A missing source is a no-op.
pub async fn merge_local_fallback(local_root: &Path, canonical_root: &Path) -> Result<()> {
    if tokio::fs::metadata(local_root).await.is_err() {
        debug!(path = %local_root.display(), "No local fallback tree to merge");
        return Ok(());
    }

    info!(
        from = %local_root.display(),
        to = %canonical_root.display(),
        "Merging local fallback data into canonical upload tree"
    );

    copy_tree(local_root, canonical_root).await?;

    tokio::fs::remove_dir_all(local_root)
        .await
        .with_context(|| format!("Failed to remove merged source {}", local_root.display()))?;

    Ok(())
}

/// Recursively copies `src` onto `dst`, overwriting existing files.
fn copy_tree<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst)
            .await
            .with_context(|| format!("Failed to create directory {}", dst.display()))?;

        let mut entries = tokio::fs::read_dir(src)
            .await
            .with_context(|| format!("Failed to read directory {}", src.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            if entry.metadata().await?.is_dir() {
                copy_tree_into(&from, &to).await?;
            } else {
                tokio::fs::copy(&from, &to).await.with_context(|| {
                    format!("Failed to copy {} to {}", from.display(), to.display())
                })?;
            }
        }
        Ok(())
    })
}

async fn copy_tree_into(src: &Path, dst: &Path) -> Result<()> {
    copy_tree(src, dst).await
}

// ============================================================================
// T103: stage_previous_logs()
// ============================================================================

/// Moves every `*.log` file except `current_file` from `log_dir` into
/// `upload_dir/logs`, returning how many were staged.
///
/// Logs from earlier runs are data too: the only way to debug a pod that
/// has been alone in a forest for six months is to ship its logs home.
pub async fn stage_previous_logs(
    log_dir: &Path,
    current_file: &str,
    upload_dir: &Path,
) -> Result<u32> {
    if tokio::fs::metadata(log_dir).await.is_err() {
        return Ok(0);
    }

    let staged_dir = upload_dir.join("logs");
    tokio::fs::create_dir_all(&staged_dir)
        .await
        .with_context(|| format!("Failed to create {}", staged_dir.display()))?;

    let mut moved = 0;
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .with_context(|| format!("Failed to read log directory {}", log_dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.ends_with(".log") || name == current_file {
            continue;
        }

        let from = entry.path();
        let to = staged_dir.join(name.as_ref());
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => {
                info!(file = %name, "Staged previous run log for upload");
                moved += 1;
            }
            Err(e) => {
                // Not critical; the log can stay where it is.
                warn!(file = %name, error = %e, "Could not stage log file");
            }
        }
    }

    Ok(moved)
}

// ============================================================================
// Unit tests
// ============================================================================
