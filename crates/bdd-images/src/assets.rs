//! Gallery asset provisioning.
//!
//! The lightbox script and stylesheets are embedded in the binary and
//! copied once per run into `<log root>/image_attachments_utils`. Parallel
//! runner processes share that folder, so the copy happens under an
//! exclusive lock on `<assets dir>.lock` and is marked done with a
//! `.copy_complete` file. Losing the race is not an error: the process that
//! holds the lock finishes the copy.

use crate::config::ImagesConfig;
use crate::result::ImagesResult;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Marker written once all assets are in place
pub const COPY_COMPLETE_MARKER: &str = ".copy_complete";

/// Files copied into the assets folder
pub const GALLERY_ASSETS: [(&str, &str); 3] = [
    ("lightbox.js", include_str!("../assets/lightbox.js")),
    ("lightbox.css", include_str!("../assets/lightbox.css")),
    ("gallery.css", include_str!("../assets/gallery.css")),
];

/// What provisioning did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// No log root configured
    Disabled,
    /// Marker already present, nothing copied
    AlreadyComplete(PathBuf),
    /// Assets copied under the lock
    Copied(PathBuf),
    /// Another process kept the lock past the timeout
    LockTimeout(PathBuf),
    /// Locking is unsupported here; missing files were copied without it
    CopiedUnlocked(PathBuf),
}

enum LockFailure {
    Timeout,
    Unavailable(io::Error),
}

/// Exclusive lock on the provisioning lock file, released on drop
struct ProvisionLock {
    file: File,
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn acquire_lock(path: &Path, config: &ImagesConfig) -> Result<ProvisionLock, LockFailure> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(LockFailure::Unavailable)?;
    let contended = fs2::lock_contended_error().raw_os_error();
    let start = Instant::now();

    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(ProvisionLock { file }),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == contended => {
                if start.elapsed() >= config.lock_timeout {
                    return Err(LockFailure::Timeout);
                }
                std::thread::sleep(config.lock_retry_interval);
            }
            Err(err) => return Err(LockFailure::Unavailable(err)),
        }
    }
}

fn lock_path(assets_dir: &Path) -> PathBuf {
    let mut name = assets_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    assets_dir.with_file_name(name)
}

fn copy_assets(assets_dir: &Path, overwrite: bool) -> io::Result<()> {
    fs::create_dir_all(assets_dir)?;
    for (name, contents) in GALLERY_ASSETS {
        let path = assets_dir.join(name);
        if overwrite || !path.exists() {
            fs::write(path, contents)?;
        }
    }
    fs::write(assets_dir.join(COPY_COMPLETE_MARKER), b"complete\n")
}

/// Copy the gallery assets into the shared folder, at most once per run
/// across processes.
///
/// # Errors
///
/// Returns an I/O error if the log root cannot be created or the assets
/// cannot be written.
pub fn provision_gallery_assets(config: &ImagesConfig) -> ImagesResult<ProvisionOutcome> {
    let Some(assets_dir) = config.assets_dir() else {
        debug!("no log root configured, gallery assets not provisioned");
        return Ok(ProvisionOutcome::Disabled);
    };
    let marker = assets_dir.join(COPY_COMPLETE_MARKER);
    if marker.exists() {
        return Ok(ProvisionOutcome::AlreadyComplete(assets_dir));
    }
    if let Some(parent) = assets_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    match acquire_lock(&lock_path(&assets_dir), config) {
        Ok(_lock) => {
            if marker.exists() {
                return Ok(ProvisionOutcome::AlreadyComplete(assets_dir));
            }
            copy_assets(&assets_dir, true)?;
            debug!("gallery assets copied to {}", assets_dir.display());
            Ok(ProvisionOutcome::Copied(assets_dir))
        }
        Err(LockFailure::Timeout) => {
            info!(
                "Timed out waiting for the gallery asset lock, another process is copying them to {}",
                assets_dir.display()
            );
            Ok(ProvisionOutcome::LockTimeout(assets_dir))
        }
        Err(LockFailure::Unavailable(err)) => {
            warn!("File locking unavailable ({err}), copying gallery assets without it");
            copy_assets(&assets_dir, false)?;
            Ok(ProvisionOutcome::CopiedUnlocked(assets_dir))
        }
    }
}
