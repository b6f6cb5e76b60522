//! Hook interception.
//!
//! [`HookRegistry`] owns the dispatcher the host calls through. Installing
//! the plugin replaces it, exactly once per registry, with a
//! [`PluginDispatcher`] that wraps the host's original dispatcher:
//!
//! ```text
//! before_* / tag hooks:  original hook -> plugin handler
//! after_* hooks:         plugin handler -> original hook
//! ```
//!
//! Failures on either side are logged and swallowed. A panic escaping the
//! routing itself falls back to the original hook, unless it already ran
//! for this event.

use crate::host::{
    lock_context, HookArg, HookCall, HookConvention, HookDispatcher, HookError, HookName,
    HookTarget, HostInfo, SharedContext,
};
use crate::config::ImagesConfig;
use crate::lifecycle::{ImagesPlugin, LifecycleHandler};
use crate::result::{ImagesError, ImagesResult};
use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tracing::{debug, error};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Whether the original hook runs after the plugin handler
fn runs_original_after(name: &str) -> bool {
    name.starts_with("after_") && name != HookName::AfterTag.as_str()
}

#[derive(Debug, Default)]
struct Resolved {
    context: Option<SharedContext>,
    target: Option<HookTarget>,
}

/// Dispatcher routing every hook to the host and to a [`LifecycleHandler`]
pub struct PluginDispatcher {
    original: Arc<dyn HookDispatcher>,
    handler: Arc<dyn LifecycleHandler>,
    host: HostInfo,
}

impl std::fmt::Debug for PluginDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDispatcher")
            .field("host", &self.host)
            .finish()
    }
}

impl PluginDispatcher {
    /// Wrap `original`
    #[must_use]
    pub fn new(
        original: Arc<dyn HookDispatcher>,
        handler: Arc<dyn LifecycleHandler>,
        host: HostInfo,
    ) -> Self {
        Self {
            original,
            handler,
            host,
        }
    }

    /// Argument convention in use
    #[must_use]
    pub const fn convention(&self) -> HookConvention {
        self.host.version.convention()
    }

    fn resolve(&self, call: &HookCall) -> Resolved {
        let run_level = call.hook().is_some_and(HookName::is_run_level);
        let extra_context = || call.extra.iter().find_map(HookArg::as_context);
        match self.convention() {
            HookConvention::TargetFirst => Resolved {
                context: self
                    .original
                    .runner_context()
                    .or_else(extra_context)
                    .or_else(|| call.arg.as_context()),
                target: if run_level { None } else { call.arg.as_target() },
            },
            HookConvention::ContextFirst => Resolved {
                context: call.arg.as_context().or_else(extra_context),
                target: if run_level {
                    None
                } else {
                    call.extra.iter().find_map(HookArg::as_target)
                },
            },
        }
    }

    /// Run the host hook under a guard. Returns whether it was invoked.
    fn run_original(&self, call: &HookCall) -> bool {
        if self.host.dry_run {
            return false;
        }
        match catch_unwind(AssertUnwindSafe(|| self.original.dispatch(call))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(hook = %call.name, "Unexpected error in '{}' (host hook): {err}", call.name);
            }
            Err(payload) => error!(
                hook = %call.name,
                "Unexpected error in '{}' (host hook): {}",
                call.name,
                panic_message(payload.as_ref())
            ),
        }
        true
    }

    fn run_handler(&self, hook: HookName, context: &SharedContext, target: Option<&HookTarget>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| -> ImagesResult<()> {
            let mut ctx = lock_context(context);
            let handler = self.handler.as_ref();
            match (hook, target) {
                (HookName::BeforeAll, _) => handler.before_all(&mut ctx),
                (HookName::AfterAll, _) => handler.after_all(&mut ctx),
                (HookName::BeforeFeature, Some(HookTarget::Feature(feature)))
                    if feature.is_valid() =>
                {
                    handler.before_feature(&mut ctx, feature)
                }
                (HookName::AfterFeature, Some(HookTarget::Feature(feature)))
                    if feature.is_valid() =>
                {
                    handler.after_feature(&mut ctx, feature)
                }
                (HookName::BeforeScenario, Some(HookTarget::Scenario(scenario)))
                    if scenario.name.is_some() =>
                {
                    handler.before_scenario(&mut ctx, scenario)
                }
                (HookName::AfterScenario, Some(HookTarget::Scenario(scenario)))
                    if scenario.name.is_some() && scenario.status.is_some() =>
                {
                    handler.after_scenario(&mut ctx, scenario)
                }
                (HookName::BeforeStep, Some(HookTarget::Step(step))) if step.is_valid() => {
                    handler.before_step(&mut ctx, step)
                }
                (HookName::AfterStep, Some(HookTarget::Step(step))) if step.is_valid() => {
                    handler.after_step(&mut ctx, step)
                }
                _ => {
                    debug!(hook = %hook, "hook target not usable, plugin handler skipped");
                    Ok(())
                }
            }
        }));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => ImagesError::hook(hook.as_str(), panic_message(payload.as_ref())),
        };
        error!(hook = %hook, "Unexpected error in '{hook}' (bdd-images): {failure}");
    }

    fn route(&self, call: &HookCall, original_invoked: &Cell<bool>) {
        let resolved = self.resolve(call);
        let after = runs_original_after(&call.name);

        if !after {
            original_invoked.set(self.run_original(call));
        }

        match (call.hook(), resolved.context.as_ref()) {
            (Some(hook), Some(context)) if !hook.is_tag() => {
                self.run_handler(hook, context, resolved.target.as_ref());
            }
            (Some(hook), None) if !hook.is_tag() => {
                debug!(hook = %hook, "no execution context, plugin handler skipped");
            }
            _ => {}
        }

        if after {
            original_invoked.set(self.run_original(call));
        }
    }
}

impl HookDispatcher for PluginDispatcher {
    fn dispatch(&self, call: &HookCall) -> Result<(), HookError> {
        let original_invoked = Cell::new(false);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.route(call, &original_invoked)))
        {
            error!(
                hook = %call.name,
                "Unexpected error in '{}' (bdd-images): {}",
                call.name,
                panic_message(payload.as_ref())
            );
            if !original_invoked.get() {
                self.run_original(call);
            }
        }
        Ok(())
    }

    fn runner_context(&self) -> Option<SharedContext> {
        self.original.runner_context()
    }
}

/// Dispatcher the host calls through, patched at most once
pub struct HookRegistry {
    original: Arc<dyn HookDispatcher>,
    active: RwLock<Arc<dyn HookDispatcher>>,
    installed: Mutex<bool>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl HookRegistry {
    /// Registry dispatching straight to `original`
    #[must_use]
    pub fn new(original: Arc<dyn HookDispatcher>) -> Self {
        Self {
            active: RwLock::new(Arc::clone(&original)),
            original,
            installed: Mutex::new(false),
        }
    }

    /// Process-wide registry. The dispatcher passed on the first call wins;
    /// later arguments are ignored.
    pub fn global(original: Arc<dyn HookDispatcher>) -> &'static Self {
        static GLOBAL: OnceLock<HookRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(original))
    }

    /// Wrap the original dispatcher with `handler`.
    ///
    /// Returns `false` without changing anything when already installed.
    pub fn ensure_installed(&self, handler: Arc<dyn LifecycleHandler>, host: HostInfo) -> bool {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if *installed {
            debug!("hook shim already installed");
            return false;
        }
        let wrapped = PluginDispatcher::new(Arc::clone(&self.original), handler, host);
        debug!(
            version = %host.version,
            convention = ?wrapped.convention(),
            dry_run = host.dry_run,
            "hook shim installed"
        );
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(wrapped);
        *installed = true;
        true
    }

    /// Whether the shim is installed
    #[must_use]
    pub fn is_installed(&self) -> bool {
        *self.installed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current dispatcher
    #[must_use]
    pub fn dispatcher(&self) -> Arc<dyn HookDispatcher> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Restore the original dispatcher
    pub fn reset(&self) {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::clone(&self.original);
        *installed = false;
    }
}

impl HookDispatcher for HookRegistry {
    fn dispatch(&self, call: &HookCall) -> Result<(), HookError> {
        self.dispatcher().dispatch(call)
    }

    fn runner_context(&self) -> Option<SharedContext> {
        self.original.runner_context()
    }
}

/// Install [`ImagesPlugin`] into the process-wide registry.
///
/// Safe to call from every worker initialization; only the first call
/// patches the dispatcher.
pub fn install(
    original: Arc<dyn HookDispatcher>,
    host: HostInfo,
    config: ImagesConfig,
) -> &'static HookRegistry {
    let registry = HookRegistry::global(original);
    registry.ensure_installed(Arc::new(ImagesPlugin::new(config)), host);
    registry
}
