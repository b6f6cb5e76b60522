//! bdd-images: screenshots and log captions for BDD test runs
//!
//! Step code attaches screenshots to the running scenario. Consecutive
//! frames that look the same (equal perceptual dHash) collapse into one
//! image whose caption collects the log lines emitted meanwhile. When a
//! scenario ends the images are written next to its logs together with a
//! lightbox gallery page.
//!
//! # Architecture
//!
//! ```text
//! host runner ──► HookRegistry ──► PluginDispatcher ──┬──► original host hooks
//!                                                     └──► ImagesPlugin
//!                                                            │
//!               CaptureLayer (tracing) ──► LogCapture ──►  AttachmentState
//!                                                            │  dhash / format / normalize
//!                                                            ▼
//!                                              <scenario>/0001.png, images.html
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod assets;
pub mod attachments;
pub mod config;
pub mod format;
pub mod gallery;
pub mod hash;
pub mod host;
pub mod lifecycle;
pub mod log_capture;
pub mod normalize;
mod result;
pub mod shim;

pub use assets::{provision_gallery_assets, ProvisionOutcome, COPY_COMPLETE_MARKER};
pub use attachments::{
    attach_image, attach_image_from_file, clear_attachments, collect_captions, flush_to_disk,
    set_publish_condition, AttachOutcome, Attachment, AttachmentState, FlushReport,
};
pub use config::{ImagesConfig, KeyMode, PublishCondition};
pub use format::{detect_format, ImageFormat};
pub use gallery::{render_gallery, Gallery, GALLERY_FILE_NAME};
pub use hash::{dhash, dhash_bytes, dhash_bytes_sized, ImageHash, DEFAULT_HASH_SIZE};
pub use host::{
    lock_context, ExecutionContext, FeatureInfo, HookArg, HookCall, HookConvention,
    HookDispatcher, HookError, HookName, HookTarget, HostInfo, HostParams, HostVersion,
    ScenarioInfo, ScenarioStatus, SharedContext, StepInfo,
};
pub use lifecycle::{ImagesPlugin, LifecycleHandler};
pub use log_capture::{CaptureGuard, CaptureLayer, CaptureSinks, LogCapture};
pub use normalize::normalize;
pub use result::{ImagesError, ImagesResult};
pub use shim::{install, HookRegistry, PluginDispatcher};
