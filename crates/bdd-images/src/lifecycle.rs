//! Lifecycle handlers run by the hook shim.
//!
//! [`LifecycleHandler`] is the plugin-side counterpart of the host's hooks.
//! [`ImagesPlugin`] is the image capture implementation: it provisions the
//! gallery assets once per run, gives every scenario fresh attachment state
//! and a log buffer, and publishes the images when the scenario ends.

use crate::assets::{provision_gallery_assets, ProvisionOutcome};
use crate::attachments::AttachmentState;
use crate::config::ImagesConfig;
use crate::gallery::render_gallery;
use crate::host::{ExecutionContext, FeatureInfo, ScenarioInfo, StepInfo};
use crate::log_capture::{CaptureSinks, LogCapture};
use crate::result::ImagesResult;
use tracing::{debug, warn};

/// Scenario title used when the host gives none
pub const DEFAULT_GALLERY_TITLE: &str = "Scenario";

/// Plugin logic for each host lifecycle hook.
///
/// Every method defaults to doing nothing. Errors and panics are caught by
/// the shim and logged; they never reach the host.
pub trait LifecycleHandler: Send + Sync {
    /// Run start
    fn before_all(&self, _context: &mut ExecutionContext) -> ImagesResult<()> {
        Ok(())
    }

    /// Feature start
    fn before_feature(
        &self,
        _context: &mut ExecutionContext,
        _feature: &FeatureInfo,
    ) -> ImagesResult<()> {
        Ok(())
    }

    /// Scenario start
    fn before_scenario(
        &self,
        _context: &mut ExecutionContext,
        _scenario: &ScenarioInfo,
    ) -> ImagesResult<()> {
        Ok(())
    }

    /// Step start
    fn before_step(&self, _context: &mut ExecutionContext, _step: &StepInfo) -> ImagesResult<()> {
        Ok(())
    }

    /// Step end
    fn after_step(&self, _context: &mut ExecutionContext, _step: &StepInfo) -> ImagesResult<()> {
        Ok(())
    }

    /// Scenario end
    fn after_scenario(
        &self,
        _context: &mut ExecutionContext,
        _scenario: &ScenarioInfo,
    ) -> ImagesResult<()> {
        Ok(())
    }

    /// Feature end
    fn after_feature(
        &self,
        _context: &mut ExecutionContext,
        _feature: &FeatureInfo,
    ) -> ImagesResult<()> {
        Ok(())
    }

    /// Run end
    fn after_all(&self, _context: &mut ExecutionContext) -> ImagesResult<()> {
        Ok(())
    }
}

/// Screenshot capture plugin
#[derive(Debug, Clone)]
pub struct ImagesPlugin {
    config: ImagesConfig,
    sinks: CaptureSinks,
}

impl ImagesPlugin {
    /// Plugin feeding the process-wide capture sinks
    #[must_use]
    pub fn new(config: ImagesConfig) -> Self {
        Self {
            config,
            sinks: CaptureSinks::global().clone(),
        }
    }

    /// Use a specific sink set (the one installed in the subscriber)
    #[must_use]
    pub fn with_sinks(mut self, sinks: CaptureSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ImagesConfig {
        &self.config
    }

    /// Sinks receiving scenario logs
    #[must_use]
    pub const fn sinks(&self) -> &CaptureSinks {
        &self.sinks
    }
}

impl LifecycleHandler for ImagesPlugin {
    fn before_all(&self, context: &mut ExecutionContext) -> ImagesResult<()> {
        context.needs_gallery = !context.params.formatter_specified();
        if !context.needs_gallery {
            debug!("formatter specified, standalone galleries disabled");
            return Ok(());
        }
        match provision_gallery_assets(&self.config)? {
            ProvisionOutcome::LockTimeout(dir) => {
                warn!("gallery assets may be incomplete in {}", dir.display());
            }
            outcome => debug!(?outcome, "gallery assets ready"),
        }
        Ok(())
    }

    fn before_scenario(
        &self,
        context: &mut ExecutionContext,
        scenario: &ScenarioInfo,
    ) -> ImagesResult<()> {
        // A capture left attached by a scenario that never finished
        if let Some(stale) = context.images.log_capture() {
            drop(self.sinks.release_on_drop(stale));
        }
        let capture = LogCapture::new();
        self.sinks.attach(&capture);
        context.images =
            AttachmentState::for_scenario(&self.config, context.log_path.clone(), Some(capture));
        if let Some(condition) = context.publish_condition {
            context.images.set_publish_condition(condition);
        }
        debug!(scenario = scenario.name.as_deref().unwrap_or_default(), "image capture started");
        Ok(())
    }

    fn before_step(&self, context: &mut ExecutionContext, step: &StepInfo) -> ImagesResult<()> {
        context
            .images
            .record_step(step.is_from_feature_file(), step.line);
        Ok(())
    }

    fn after_scenario(
        &self,
        context: &mut ExecutionContext,
        scenario: &ScenarioInfo,
    ) -> ImagesResult<()> {
        let _detach = context
            .images
            .log_capture()
            .map(|capture| self.sinks.release_on_drop(capture));

        let images = &context.images;
        if !images.publish_condition().should_publish(scenario.failed()) {
            debug!(condition = %images.publish_condition(), "scenario images not published");
            return Ok(());
        }
        let report = images.flush_to_disk();
        if !report.is_complete() {
            warn!(failed = report.failed.len(), "some scenario images could not be written");
        }
        if context.needs_gallery {
            if let Some(folder) = images.destination_folder() {
                let title = scenario.name.as_deref().unwrap_or(DEFAULT_GALLERY_TITLE);
                render_gallery(folder, title, &images.collect_captions())?;
            }
        }
        Ok(())
    }
}
