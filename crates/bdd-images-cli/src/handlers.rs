//! Subcommand implementations

use crate::commands::{GalleryArgs, HashArgs, ProvisionArgs, SniffArgs};
use crate::error::{CliError, CliResult};
use bdd_images::{
    detect_format, dhash_bytes_sized, provision_gallery_assets, Gallery, ImageFormat, ImageHash,
    ImagesConfig, ProvisionOutcome,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Bytes read from each file when sniffing
const SNIFF_PREFIX_LEN: u64 = 16;

/// Largest accepted `--size`; the image is resized to `(size + 1) x size`
pub const MAX_HASH_SIZE: usize = 64;

/// Load a captions file.
///
/// Accepts a flat `{"0001": "caption"}` object or the attachment export
/// (`{"0001": {"captions": ["a<br>", "b<br>"], ...}}`).
pub fn load_captions(path: &Path) -> CliResult<BTreeMap<String, Vec<String>>> {
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let Value::Object(entries) = value else {
        return Err(CliError::captions("expected a JSON object keyed by image name"));
    };
    entries
        .into_iter()
        .map(|(key, entry)| {
            let caption = match entry {
                Value::String(caption) => vec![caption],
                Value::Object(record) => match record.get("captions") {
                    Some(Value::Array(lines)) => lines
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    _ => return Err(CliError::captions(format!("'{key}' has no captions list"))),
                },
                _ => return Err(CliError::captions(format!("unsupported caption for '{key}'"))),
            };
            Ok((key, caption))
        })
        .collect()
}

/// Render `images.html`; `None` when the folder holds no images
pub fn run_gallery(args: &GalleryArgs) -> CliResult<Option<PathBuf>> {
    if !args.folder.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "{} is not a directory",
            args.folder.display()
        )));
    }
    let captions = match &args.captions {
        Some(path) => load_captions(path)?,
        None => BTreeMap::new(),
    };
    let mut gallery = Gallery::new(&args.title);
    if let Some(href) = &args.assets_href {
        gallery = gallery.with_assets_href(href);
    }
    Ok(gallery.write(&args.folder, &captions)?)
}

/// dHash of every image, in argument order
pub fn run_hash(args: &HashArgs) -> CliResult<Vec<(PathBuf, ImageHash)>> {
    if !(1..=MAX_HASH_SIZE).contains(&args.size) {
        return Err(CliError::invalid_argument(format!(
            "hash size must be between 1 and {MAX_HASH_SIZE}, got {}",
            args.size
        )));
    }
    args.images
        .iter()
        .map(|path| {
            let hash = dhash_bytes_sized(&fs::read(path)?, args.size)?;
            debug!(path = %path.display(), hash = %hash, "hashed");
            Ok((path.clone(), hash))
        })
        .collect()
}

/// Detected format of every file, in argument order
pub fn run_sniff(args: &SniffArgs) -> CliResult<Vec<(PathBuf, ImageFormat)>> {
    args.files
        .iter()
        .map(|path| {
            let mut prefix = Vec::new();
            File::open(path)?
                .take(SNIFF_PREFIX_LEN)
                .read_to_end(&mut prefix)?;
            Ok((path.clone(), detect_format(&prefix)))
        })
        .collect()
}

/// Provision gallery assets under the log root
pub fn run_provision(args: &ProvisionArgs) -> CliResult<ProvisionOutcome> {
    let mut config =
        ImagesConfig::from_env().with_lock_timeout(Duration::from_secs(args.timeout));
    if let Some(root) = &args.log_root {
        config = config.with_log_root(root);
    }
    match provision_gallery_assets(&config)? {
        ProvisionOutcome::Disabled => Err(CliError::invalid_argument(
            "no log root: pass --log-root or set LOGS",
        )),
        outcome => Ok(outcome),
    }
}
