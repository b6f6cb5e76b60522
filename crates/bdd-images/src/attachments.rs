//! Per-scenario image attachments.
//!
//! Every attached frame is sniffed, normalized to PNG and hashed. Frames
//! whose dHash equals the previous one are treated as the same screen:
//! they replace the stored bytes of the current attachment and keep
//! extending its caption. A distinct frame opens a new attachment key.

use crate::config::{ImagesConfig, KeyMode, PublishCondition};
use crate::format::{detect_format, ImageFormat};
use crate::hash::{dhash_bytes, ImageHash};
use crate::host::ExecutionContext;
use crate::log_capture::LogCapture;
use crate::normalize::normalize;
use crate::result::{ImagesError, ImagesResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Line breaks appended after an explicit caption header
const HEADER_LINE_BREAKS: usize = 2;

/// One stored image and the captions gathered for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// PNG bytes of the latest frame under this key
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    /// Where the image is written on flush
    pub destination: PathBuf,
    /// Normalized caption lines
    pub captions: Vec<String>,
}

impl Attachment {
    /// Captions joined into the gallery title text
    #[must_use]
    pub fn caption_text(&self) -> String {
        self.captions.concat()
    }
}

/// Result of a single attach call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOutcome {
    /// Key the frame was stored under
    pub key: String,
    /// Whether the frame opened a new attachment
    pub distinct: bool,
}

/// Result of writing attachments to disk
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Files that could not be written, with the error text
    pub failed: Vec<(PathBuf, String)>,
}

impl FlushReport {
    /// No file failed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Image state of the running scenario
#[derive(Debug, Default)]
pub struct AttachmentState {
    publish_condition: PublishCondition,
    key_mode: KeyMode,
    last_image_hash: Option<ImageHash>,
    attached_images_index: u32,
    current_key: Option<String>,
    attached_images: BTreeMap<String, Attachment>,
    pending_caption_lines: Vec<String>,
    pending_image_bytes: Option<Vec<u8>>,
    log_capture: Option<LogCapture>,
    current_step_source_line: u32,
    last_feature_line: u32,
    destination_folder: Option<PathBuf>,
}

impl AttachmentState {
    /// Fresh state for a scenario writing into `destination_folder`
    #[must_use]
    pub fn for_scenario(
        config: &ImagesConfig,
        destination_folder: Option<PathBuf>,
        log_capture: Option<LogCapture>,
    ) -> Self {
        Self {
            publish_condition: config.publish_condition,
            key_mode: config.key_mode,
            destination_folder,
            log_capture,
            ..Self::default()
        }
    }

    /// Current publish condition
    #[must_use]
    pub const fn publish_condition(&self) -> PublishCondition {
        self.publish_condition
    }

    /// Replace the publish condition; the last call before the scenario ends wins
    pub fn set_publish_condition(&mut self, condition: PublishCondition) {
        self.publish_condition = condition;
    }

    /// Number of distinct frames seen since the scenario started or was cleared
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.attached_images_index
    }

    /// Hash of the most recent frame
    #[must_use]
    pub const fn last_hash(&self) -> Option<&ImageHash> {
        self.last_image_hash.as_ref()
    }

    /// Captions accumulated for the current attachment
    #[must_use]
    pub fn pending_captions(&self) -> &[String] {
        &self.pending_caption_lines
    }

    /// PNG bytes of the latest frame
    #[must_use]
    pub fn pending_image(&self) -> Option<&[u8]> {
        self.pending_image_bytes.as_deref()
    }

    /// Stored attachments by key
    #[must_use]
    pub const fn attachments(&self) -> &BTreeMap<String, Attachment> {
        &self.attached_images
    }

    /// Folder the images are flushed to
    #[must_use]
    pub fn destination_folder(&self) -> Option<&Path> {
        self.destination_folder.as_deref()
    }

    /// Log buffer of this scenario
    #[must_use]
    pub const fn log_capture(&self) -> Option<&LogCapture> {
        self.log_capture.as_ref()
    }

    /// Source line of the running step
    #[must_use]
    pub const fn current_step_line(&self) -> u32 {
        self.current_step_source_line
    }

    /// Track the step's source line. Steps invoked from step code (not read
    /// from a `.feature` file) keep the line of the enclosing feature step.
    pub fn record_step(&mut self, from_feature_file: bool, line: Option<u32>) {
        match line {
            Some(line) if from_feature_file => {
                self.last_feature_line = line;
                self.current_step_source_line = line;
            }
            _ => self.current_step_source_line = self.last_feature_line,
        }
    }

    /// Attach an in-memory PNG or JPEG frame
    ///
    /// # Errors
    ///
    /// Fails for payloads that are neither PNG nor JPEG, for JPEG data
    /// that cannot be transcoded, and when the scenario has no
    /// destination folder.
    pub fn attach_image(
        &mut self,
        image_bytes: &[u8],
        header: Option<&str>,
    ) -> ImagesResult<AttachOutcome> {
        let format = detect_format(image_bytes);
        if !format.is_attachable() {
            return Err(ImagesError::UnsupportedFormat {
                format: format.to_string(),
            });
        }
        let folder = self
            .destination_folder
            .clone()
            .ok_or(ImagesError::NoDestination)?;
        let png = match format {
            ImageFormat::Jpeg => transcode_to_png(image_bytes)?,
            _ => image_bytes.to_vec(),
        };

        let hash = match dhash_bytes(&png) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!("Could not hash attached image, keeping it as a new frame: {err}");
                None
            }
        };
        let distinct =
            self.current_key.is_none() || hash.is_none() || hash != self.last_image_hash;
        if distinct {
            self.attached_images_index += 1;
            self.pending_caption_lines.clear();
            self.current_key = Some(
                self.key_mode
                    .key(self.current_step_source_line, self.attached_images_index),
            );
        }
        self.last_image_hash = hash;
        self.pending_image_bytes = Some(png.clone());

        if let Some(header) = header {
            self.pending_caption_lines
                .push(normalize(header, HEADER_LINE_BREAKS));
        }
        if let Some(capture) = self.log_capture.as_ref().filter(|c| !c.is_closed()) {
            self.pending_caption_lines
                .extend(capture.drain_lines().iter().map(|line| {
                    normalize(line.trim_end_matches(['\r', '\n']), 1)
                }));
        }

        let key = self.current_key.clone().unwrap_or_default();
        debug!(key = %key, distinct, "image attached");
        self.attached_images.insert(
            key.clone(),
            Attachment {
                image_bytes: png,
                destination: folder.join(format!("{key}.png")),
                captions: self.pending_caption_lines.clone(),
            },
        );
        Ok(AttachOutcome { key, distinct })
    }

    /// Attach a `.png` or `.jpg` file from disk
    ///
    /// # Errors
    ///
    /// Fails when the file is missing, has another extension, cannot be
    /// read, or is rejected by [`Self::attach_image`].
    pub fn attach_image_from_file(
        &mut self,
        path: &Path,
        header: Option<&str>,
    ) -> ImagesResult<AttachOutcome> {
        if !path.is_file() {
            return Err(ImagesError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("jpg"));
        if !supported {
            return Err(ImagesError::UnsupportedExtension {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        self.attach_image(&bytes, header)
    }

    /// Drop all attachments, pending captions and buffered log text
    pub fn clear(&mut self) {
        self.attached_images.clear();
        self.attached_images_index = 0;
        self.current_key = None;
        self.last_image_hash = None;
        self.pending_caption_lines.clear();
        self.pending_image_bytes = None;
        if let Some(capture) = &self.log_capture {
            capture.truncate();
        }
    }

    /// Write every attachment to its destination. Failures are logged and
    /// reported per file; the remaining files are still written.
    pub fn flush_to_disk(&self) -> FlushReport {
        let mut report = FlushReport::default();
        if let Some(folder) = &self.destination_folder {
            if !self.attached_images.is_empty() {
                if let Err(err) = fs::create_dir_all(folder) {
                    error!("Could not create image folder {}: {err}", folder.display());
                }
            }
        }
        for attachment in self.attached_images.values() {
            match fs::write(&attachment.destination, &attachment.image_bytes) {
                Ok(()) => report.written.push(attachment.destination.clone()),
                Err(err) => {
                    error!(
                        "Error writing image {}: {err}",
                        attachment.destination.display()
                    );
                    report
                        .failed
                        .push((attachment.destination.clone(), err.to_string()));
                }
            }
        }
        report
    }

    /// Caption lines keyed by attachment key
    #[must_use]
    pub fn collect_captions(&self) -> BTreeMap<String, Vec<String>> {
        self.attached_images
            .iter()
            .map(|(key, attachment)| (key.clone(), attachment.captions.clone()))
            .collect()
    }

    /// Attachment destinations and captions as JSON, for external formatters
    ///
    /// # Errors
    ///
    /// Returns [`ImagesError::Json`] if serialization fails.
    pub fn captions_json(&self) -> ImagesResult<String> {
        Ok(serde_json::to_string_pretty(&self.attached_images)?)
    }
}

fn transcode_to_png(jpeg: &[u8]) -> ImagesResult<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| ImagesError::decode(format!("JPEG image could not be converted: {e}")))?;
    let mut png = Cursor::new(Vec::new());
    decoded
        .write_to(&mut png, image::ImageFormat::Png)
        .map_err(|e| ImagesError::encode(e.to_string()))?;
    Ok(png.into_inner())
}

/// Set when the scenario's images are published.
///
/// Applies to the running scenario and to every scenario started later,
/// so it can be called from `before_all` or `before_feature` too.
pub fn set_publish_condition(context: &mut ExecutionContext, condition: PublishCondition) {
    context.publish_condition = Some(condition);
    context.images.set_publish_condition(condition);
}

/// Attach an in-memory frame to the running scenario
///
/// # Errors
///
/// See [`AttachmentState::attach_image`].
pub fn attach_image(
    context: &mut ExecutionContext,
    image_bytes: &[u8],
    header: Option<&str>,
) -> ImagesResult<AttachOutcome> {
    context.images.attach_image(image_bytes, header)
}

/// Attach an image file to the running scenario
///
/// # Errors
///
/// See [`AttachmentState::attach_image_from_file`].
pub fn attach_image_from_file(
    context: &mut ExecutionContext,
    path: impl AsRef<Path>,
    header: Option<&str>,
) -> ImagesResult<AttachOutcome> {
    context.images.attach_image_from_file(path.as_ref(), header)
}

/// Discard everything attached so far in the running scenario
pub fn clear_attachments(context: &mut ExecutionContext) {
    context.images.clear();
}

/// Write the running scenario's attachments to disk
pub fn flush_to_disk(context: &ExecutionContext) -> FlushReport {
    context.images.flush_to_disk()
}

/// Caption lines of the running scenario keyed by attachment key
#[must_use]
pub fn collect_captions(context: &ExecutionContext) -> BTreeMap<String, Vec<String>> {
    context.images.collect_captions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, RgbImage};
    use tempfile::TempDir;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn bars(offset: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(64, 64, |x, _| {
            if ((x + offset) / 16) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        png_bytes(&DynamicImage::ImageLuma8(img))
    }

    fn gradient() -> Vec<u8> {
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([(255 - x * 4) as u8]));
        png_bytes(&DynamicImage::ImageLuma8(img))
    }

    fn state(dir: &TempDir, capture: Option<LogCapture>) -> AttachmentState {
        AttachmentState::for_scenario(
            &ImagesConfig::new(),
            Some(dir.path().join("scenario")),
            capture,
        )
    }

    mod attach_tests {
        use super::*;

        #[test]
        fn test_distinct_frames_get_new_keys() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);

            let first = images.attach_image(&bars(0), None).unwrap();
            let second = images.attach_image(&gradient(), None).unwrap();

            assert_eq!(first.key, "0001");
            assert!(first.distinct);
            assert_eq!(second.key, "0002");
            assert!(second.distinct);
            assert_eq!(images.index(), 2);
            assert_eq!(images.attachments().len(), 2);
        }

        #[test]
        fn test_duplicate_frame_extends_caption() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));

            capture.append("INFO app: given \"I open the page\"\n");
            images.attach_image(&bars(0), None).unwrap();
            capture.append("INFO app: still loading\n");
            let again = images.attach_image(&bars(0), None).unwrap();

            assert_eq!(again.key, "0001");
            assert!(!again.distinct);
            assert_eq!(images.index(), 1);
            let record = &images.attachments()["0001"];
            assert_eq!(record.captions.len(), 2);
            assert_eq!(record.captions[0], "I open the page<br>");
            assert_eq!(record.captions[1], "INFO app: still loading<br>");
        }

        #[test]
        fn test_distinct_frame_resets_pending_captions() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));

            capture.append("first\n");
            images.attach_image(&bars(0), None).unwrap();
            capture.append("second\n");
            images.attach_image(&gradient(), None).unwrap();

            assert_eq!(images.attachments()["0001"].captions, vec!["first<br>"]);
            assert_eq!(images.attachments()["0002"].captions, vec!["second<br>"]);
            assert_eq!(images.pending_captions(), ["second<br>"]);
        }

        #[test]
        fn test_header_is_prepended() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));

            capture.append("line\n");
            images.attach_image(&bars(0), Some("Login page")).unwrap();

            assert_eq!(
                images.attachments()["0001"].captions,
                vec!["Login page<br><br>", "line<br>"]
            );
        }

        #[test]
        fn test_closed_capture_is_not_drained() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));
            capture.append("late line\n");
            capture.close();

            images.attach_image(&bars(0), None).unwrap();

            assert!(images.attachments()["0001"].captions.is_empty());
        }

        #[test]
        fn test_jpeg_is_stored_as_png() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);
            let rgb = RgbImage::from_fn(32, 32, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, 0]));
            let mut jpeg = Cursor::new(Vec::new());
            DynamicImage::ImageRgb8(rgb)
                .write_to(&mut jpeg, image::ImageFormat::Jpeg)
                .unwrap();

            images.attach_image(jpeg.get_ref(), None).unwrap();

            let stored = &images.attachments()["0001"].image_bytes;
            assert_eq!(detect_format(stored), ImageFormat::Png);
        }

        #[test]
        fn test_rejects_other_formats() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);

            let gif = images.attach_image(b"GIF89a\x01\x00\x01\x00", None);
            let text = images.attach_image(b"not an image", None);

            assert!(matches!(gif, Err(ImagesError::UnsupportedFormat { .. })));
            assert!(matches!(text, Err(ImagesError::UnsupportedFormat { .. })));
            assert!(images.attachments().is_empty());
        }

        #[test]
        fn test_broken_jpeg_is_an_error() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);

            let result = images.attach_image(&[0xFF, 0xD8, 0xFF, 0x00, 0x01], None);

            assert!(matches!(result, Err(ImagesError::Decode { .. })));
            assert_eq!(images.index(), 0);
        }

        #[test]
        fn test_undecodable_png_is_kept_as_new_frame() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);
            let mut broken = b"\x89PNG\r\n\x1a\n".to_vec();
            broken.extend_from_slice(&[0; 16]);

            let first = images.attach_image(&broken, None).unwrap();
            let second = images.attach_image(&broken, None).unwrap();

            assert!(first.distinct);
            assert!(second.distinct);
            assert!(images.last_hash().is_none());
            assert_eq!(images.attachments().len(), 2);
        }

        #[test]
        fn test_requires_destination() {
            let mut images = AttachmentState::default();
            let result = images.attach_image(&bars(0), None);
            assert!(matches!(result, Err(ImagesError::NoDestination)));
        }

        #[test]
        fn test_step_line_keys() {
            let dir = TempDir::new().unwrap();
            let config = ImagesConfig::new().with_key_mode(KeyMode::StepLine);
            let mut images =
                AttachmentState::for_scenario(&config, Some(dir.path().to_path_buf()), None);

            images.record_step(true, Some(12));
            let outcome = images.attach_image(&bars(0), None).unwrap();

            assert_eq!(outcome.key, "00012_0001");
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_attach_from_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("shot.PNG");
            fs::write(&path, bars(0)).unwrap();
            let mut images = state(&dir, None);

            let outcome = images.attach_image_from_file(&path, None).unwrap();

            assert_eq!(outcome.key, "0001");
        }

        #[test]
        fn test_missing_file() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);
            let result = images.attach_image_from_file(&dir.path().join("nope.png"), None);
            assert!(matches!(result, Err(ImagesError::FileNotFound { .. })));
        }

        #[test]
        fn test_wrong_extension() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("shot.gif");
            fs::write(&path, bars(0)).unwrap();
            let mut images = state(&dir, None);

            let result = images.attach_image_from_file(&path, None);

            assert!(matches!(result, Err(ImagesError::UnsupportedExtension { .. })));
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_clear_resets_everything() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));
            images.attach_image(&bars(0), None).unwrap();
            capture.append("buffered\n");

            images.clear();

            assert_eq!(images.index(), 0);
            assert!(images.attachments().is_empty());
            assert!(images.pending_captions().is_empty());
            assert_eq!(capture.contents(), "");
            let again = images.attach_image(&bars(0), None).unwrap();
            assert_eq!(again.key, "0001");
        }

        #[test]
        fn test_flush_writes_files() {
            let dir = TempDir::new().unwrap();
            let mut images = state(&dir, None);
            images.attach_image(&bars(0), None).unwrap();
            images.attach_image(&gradient(), None).unwrap();

            let report = images.flush_to_disk();

            assert!(report.is_complete());
            assert_eq!(report.written.len(), 2);
            assert!(dir.path().join("scenario/0001.png").is_file());
            assert!(dir.path().join("scenario/0002.png").is_file());
        }

        #[test]
        fn test_flush_reports_failures() {
            let dir = TempDir::new().unwrap();
            let blocker = dir.path().join("blocker");
            fs::write(&blocker, b"file, not a folder").unwrap();
            let mut images =
                AttachmentState::for_scenario(&ImagesConfig::new(), Some(blocker), None);
            images.attach_image(&bars(0), None).unwrap();

            let report = images.flush_to_disk();

            assert!(!report.is_complete());
            assert_eq!(report.failed.len(), 1);
        }

        #[test]
        fn test_captions_and_json() {
            let dir = TempDir::new().unwrap();
            let capture = LogCapture::new();
            let mut images = state(&dir, Some(capture.clone()));
            capture.append("a\nb\n");
            images.attach_image(&bars(0), None).unwrap();

            let captions = images.collect_captions();
            assert_eq!(captions["0001"], vec!["a<br>", "b<br>"]);
            assert_eq!(images.attachments()["0001"].caption_text(), "a<br>b<br>");

            let json: serde_json::Value =
                serde_json::from_str(&images.captions_json().unwrap()).unwrap();
            assert_eq!(json["0001"]["captions"][1], "b<br>");
            assert!(json["0001"].get("image_bytes").is_none());
        }

        #[test]
        fn test_record_step_tracks_feature_lines() {
            let mut images = AttachmentState::default();
            images.record_step(true, Some(7));
            assert_eq!(images.current_step_line(), 7);
            images.record_step(false, Some(40));
            assert_eq!(images.current_step_line(), 7);
            images.record_step(true, Some(9));
            assert_eq!(images.current_step_line(), 9);
        }

        #[test]
        fn test_context_helpers() {
            let dir = TempDir::new().unwrap();
            let mut context = ExecutionContext::default();
            context.images = state(&dir, None);

            set_publish_condition(&mut context, PublishCondition::Always);
            attach_image(&mut context, &bars(0), None).unwrap();
            assert_eq!(context.images.publish_condition(), PublishCondition::Always);
            assert_eq!(collect_captions(&context).len(), 1);
            assert_eq!(flush_to_disk(&context).written.len(), 1);
            clear_attachments(&mut context);
            assert!(context.images.attachments().is_empty());
        }
    }
}
