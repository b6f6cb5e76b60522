//! Host test-runner interfaces.
//!
//! The runner owns execution contexts and fires named lifecycle hooks
//! through a [`HookDispatcher`]. Hook targets are a closed set of variants
//! carrying only the attributes the lifecycle handlers read.

use crate::attachments::AttachmentState;
use crate::config::PublishCondition;
use crate::result::{ImagesError, ImagesResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Version assumed when the host does not report one
pub const DEFAULT_HOST_VERSION: HostVersion = HostVersion {
    major: 1,
    minor: 2,
    patch: 6,
};

/// First host version that passes hook targets instead of contexts
pub const TARGET_FIRST_SINCE: (u32, u32) = (1, 3);

/// Error raised by the host's own hook implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HookError {
    /// Error message
    pub message: String,
}

impl HookError {
    /// Create a hook error
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lifecycle hooks known to the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    /// Before the whole run
    BeforeAll,
    /// Before each feature
    BeforeFeature,
    /// Before each scenario
    BeforeScenario,
    /// Before each step
    BeforeStep,
    /// After each step
    AfterStep,
    /// After each scenario
    AfterScenario,
    /// After each feature
    AfterFeature,
    /// After the whole run
    AfterAll,
    /// Before a tag block
    BeforeTag,
    /// After a tag block
    AfterTag,
}

impl HookName {
    /// All hook names
    pub const ALL: [Self; 10] = [
        Self::BeforeAll,
        Self::BeforeFeature,
        Self::BeforeScenario,
        Self::BeforeStep,
        Self::AfterStep,
        Self::AfterScenario,
        Self::AfterFeature,
        Self::AfterAll,
        Self::BeforeTag,
        Self::AfterTag,
    ];

    /// Parse a host hook name; unknown names yield `None`
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.as_str() == name)
    }

    /// Host-facing name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAll => "before_all",
            Self::BeforeFeature => "before_feature",
            Self::BeforeScenario => "before_scenario",
            Self::BeforeStep => "before_step",
            Self::AfterStep => "after_step",
            Self::AfterScenario => "after_scenario",
            Self::AfterFeature => "after_feature",
            Self::AfterAll => "after_all",
            Self::BeforeTag => "before_tag",
            Self::AfterTag => "after_tag",
        }
    }

    /// `before_all` / `after_all`: fired without a hook target
    #[must_use]
    pub const fn is_run_level(self) -> bool {
        matches!(self, Self::BeforeAll | Self::AfterAll)
    }

    /// Tag hooks
    #[must_use]
    pub const fn is_tag(self) -> bool {
        matches!(self, Self::BeforeTag | Self::AfterTag)
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a scenario as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStatus {
    /// Not run yet
    Untested,
    /// Skipped
    Skipped,
    /// Passed
    Passed,
    /// An assertion failed
    Failed,
    /// An unexpected error occurred
    Error,
    /// A hook failed
    HookError,
}

impl ScenarioStatus {
    /// Failed or errored scenarios publish under `OnlyOnFailure`
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}

impl FromStr for ScenarioStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "untested" => Ok(Self::Untested),
            "skipped" => Ok(Self::Skipped),
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "error" => Ok(Self::Error),
            "hook_error" => Ok(Self::HookError),
            other => Err(format!("unknown scenario status '{other}'")),
        }
    }
}

/// Feature hook target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureInfo {
    /// Feature title
    pub name: Option<String>,
    /// Feature file
    pub filename: Option<PathBuf>,
}

impl FeatureInfo {
    /// Feature with a title
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            filename: None,
        }
    }

    /// Set the feature file
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// A feature needs a name or a filename
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.name.is_some() || self.filename.is_some()
    }
}

/// Scenario hook target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioInfo {
    /// Scenario title
    pub name: Option<String>,
    /// Outcome, known once the scenario ran
    pub status: Option<ScenarioStatus>,
}

impl ScenarioInfo {
    /// Scenario with a title
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            status: None,
        }
    }

    /// Set the outcome
    #[must_use]
    pub const fn with_status(mut self, status: ScenarioStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether the scenario failed or errored
    #[must_use]
    pub fn failed(&self) -> bool {
        self.status.is_some_and(ScenarioStatus::is_failure)
    }
}

/// Step hook target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepInfo {
    /// Step text
    pub name: Option<String>,
    /// `given`, `when`, `then`, ...
    pub step_type: Option<String>,
    /// File the step was read from
    pub filename: Option<String>,
    /// Line in that file
    pub line: Option<u32>,
}

impl StepInfo {
    /// Step with text
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the step keyword
    #[must_use]
    pub fn with_step_type(mut self, step_type: impl Into<String>) -> Self {
        self.step_type = Some(step_type.into());
        self
    }

    /// Set source location
    #[must_use]
    pub fn at(mut self, filename: impl Into<String>, line: u32) -> Self {
        self.filename = Some(filename.into());
        self.line = Some(line);
        self
    }

    /// A step needs a name or a keyword
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.name.is_some() || self.step_type.is_some()
    }

    /// Whether the step comes from a `.feature` file (not a nested step call)
    #[must_use]
    pub fn is_from_feature_file(&self) -> bool {
        self.filename
            .as_deref()
            .is_some_and(|f| f.contains(".feature"))
    }
}

/// Domain object a hook fires for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookTarget {
    /// Feature hooks
    Feature(FeatureInfo),
    /// Scenario hooks
    Scenario(ScenarioInfo),
    /// Step hooks
    Step(StepInfo),
}

/// Parameters the host's configuration provider exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostParams {
    /// Report formatter named on the command line, if any
    pub formatter: Option<String>,
    /// Dry run: hooks are not executed
    pub dry_run: bool,
}

impl HostParams {
    /// Whether an external formatter consumes the images
    #[must_use]
    pub fn formatter_specified(&self) -> bool {
        self.formatter.as_deref().is_some_and(|f| !f.trim().is_empty())
    }
}

/// Host-owned execution context with the plugin's per-scenario state
#[derive(Debug, Default)]
pub struct ExecutionContext {
    /// Host configuration
    pub params: HostParams,
    /// Log directory of the current scenario, set by the host
    pub log_path: Option<PathBuf>,
    /// Whether a standalone gallery must be rendered (set in `before_all`)
    pub needs_gallery: bool,
    /// Publish condition chosen from hook or step code. Outlives the
    /// scenario it was set in and seeds every later one.
    pub publish_condition: Option<PublishCondition>,
    /// Image capture state of the current scenario
    pub images: AttachmentState,
}

impl ExecutionContext {
    /// Context with host parameters
    #[must_use]
    pub fn new(params: HostParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Set the scenario log directory
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Wrap for sharing with the dispatcher
    #[must_use]
    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }
}

/// Context handle passed through hook calls
pub type SharedContext = Arc<Mutex<ExecutionContext>>;

/// Lock a shared context, recovering it if a previous holder panicked
pub fn lock_context(context: &SharedContext) -> MutexGuard<'_, ExecutionContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One positional argument of a hook call
#[derive(Debug, Clone)]
pub enum HookArg {
    /// An execution context
    Context(SharedContext),
    /// A feature, scenario or step
    Target(HookTarget),
    /// `None`
    Empty,
}

impl HookArg {
    /// The context, if this argument is one
    #[must_use]
    pub fn as_context(&self) -> Option<SharedContext> {
        match self {
            Self::Context(context) => Some(Arc::clone(context)),
            _ => None,
        }
    }

    /// The target, if this argument is one
    #[must_use]
    pub fn as_target(&self) -> Option<HookTarget> {
        match self {
            Self::Target(target) => Some(target.clone()),
            _ => None,
        }
    }
}

/// A hook invocation as issued by the host
#[derive(Debug, Clone)]
pub struct HookCall {
    /// Hook name (`before_scenario`, ...)
    pub name: String,
    /// First argument; its meaning depends on the host's [`HookConvention`]
    pub arg: HookArg,
    /// Remaining arguments
    pub extra: Vec<HookArg>,
}

impl HookCall {
    /// Create a call without extra arguments
    #[must_use]
    pub fn new(name: impl Into<String>, arg: HookArg) -> Self {
        Self {
            name: name.into(),
            arg,
            extra: Vec::new(),
        }
    }

    /// Append an extra argument
    #[must_use]
    pub fn with_extra(mut self, arg: HookArg) -> Self {
        self.extra.push(arg);
        self
    }

    /// Parsed hook name
    #[must_use]
    pub fn hook(&self) -> Option<HookName> {
        HookName::parse(&self.name)
    }
}

/// The host's hook dispatch interface
pub trait HookDispatcher: Send + Sync {
    /// Run the hook named in `call`
    ///
    /// # Errors
    ///
    /// Returns the host hook's failure.
    fn dispatch(&self, call: &HookCall) -> Result<(), HookError>;

    /// Context held by the runner itself, when it has one
    fn runner_context(&self) -> Option<SharedContext> {
        None
    }
}

/// How the host passes arguments to its hook dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookConvention {
    /// `(name, context, target)`: context first, target in the extra args
    ContextFirst,
    /// `(name, target)`: context held by the runner
    TargetFirst,
}

/// Host framework version (`major.minor[.patch]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostVersion {
    /// Major
    pub major: u32,
    /// Minor
    pub minor: u32,
    /// Patch
    pub patch: u32,
}

impl HostVersion {
    /// Create a version
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `1.2.6`, `1.3` or `1.3.0.dev2`; only the first two
    /// components are required
    ///
    /// # Errors
    ///
    /// Returns [`ImagesError::InvalidVersion`] when major or minor are not numbers.
    pub fn parse(raw: &str) -> ImagesResult<Self> {
        let invalid = || ImagesError::InvalidVersion {
            version: raw.to_string(),
        };
        let mut parts = raw.trim().trim_start_matches('v').split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let patch = parts
            .next()
            .map(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>())
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        Ok(Self::new(major, minor, patch))
    }

    /// Argument convention this version uses
    #[must_use]
    pub const fn convention(self) -> HookConvention {
        let (major, minor) = TARGET_FIRST_SINCE;
        if self.major > major || (self.major == major && self.minor >= minor) {
            HookConvention::TargetFirst
        } else {
            HookConvention::ContextFirst
        }
    }
}

impl Default for HostVersion {
    fn default() -> Self {
        DEFAULT_HOST_VERSION
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the shim needs to know about the host when it is installed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// Host framework version
    pub version: HostVersion,
    /// Dry run: original host hooks are never invoked
    pub dry_run: bool,
}

impl HostInfo {
    /// Host info for a version
    #[must_use]
    pub const fn new(version: HostVersion) -> Self {
        Self {
            version,
            dry_run: false,
        }
    }

    /// Parse the version string, falling back to [`DEFAULT_HOST_VERSION`]
    #[must_use]
    pub fn from_version_str(raw: Option<&str>) -> Self {
        let version = raw
            .and_then(|v| HostVersion::parse(v).ok())
            .unwrap_or(DEFAULT_HOST_VERSION);
        Self::new(version)
    }

    /// Set dry run
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod hook_name_tests {
        use super::*;

        #[test]
        fn test_parse_round_trip() {
            for hook in HookName::ALL {
                assert_eq!(HookName::parse(hook.as_str()), Some(hook));
            }
            assert_eq!(HookName::parse("before_everything"), None);
        }

        #[test]
        fn test_classification() {
            assert!(HookName::BeforeAll.is_run_level());
            assert!(HookName::AfterAll.is_run_level());
            assert!(!HookName::BeforeScenario.is_run_level());
            assert!(HookName::AfterTag.is_tag());
            assert!(!HookName::AfterStep.is_tag());
        }
    }

    mod version_tests {
        use super::*;

        #[test]
        fn test_parse_versions() {
            assert_eq!(HostVersion::parse("1.2.6").unwrap(), HostVersion::new(1, 2, 6));
            assert_eq!(HostVersion::parse("1.3").unwrap(), HostVersion::new(1, 3, 0));
            assert_eq!(HostVersion::parse("1.3.0.dev2").unwrap(), HostVersion::new(1, 3, 0));
            assert_eq!(HostVersion::parse("1.2.7a1").unwrap(), HostVersion::new(1, 2, 7));
            assert!(HostVersion::parse("one.two").is_err());
            assert!(HostVersion::parse("1").is_err());
        }

        #[test]
        fn test_convention_selection() {
            assert_eq!(HostVersion::new(1, 2, 6).convention(), HookConvention::ContextFirst);
            assert_eq!(HostVersion::new(1, 3, 0).convention(), HookConvention::TargetFirst);
            assert_eq!(HostVersion::new(2, 0, 0).convention(), HookConvention::TargetFirst);
            assert_eq!(HostVersion::new(0, 9, 0).convention(), HookConvention::ContextFirst);
        }

        #[test]
        fn test_host_info_fallback() {
            assert_eq!(HostInfo::from_version_str(None).version, DEFAULT_HOST_VERSION);
            assert_eq!(
                HostInfo::from_version_str(Some("garbage")).version,
                DEFAULT_HOST_VERSION
            );
            assert_eq!(
                HostInfo::from_version_str(Some("1.3.1")).version,
                HostVersion::new(1, 3, 1)
            );
        }
    }

    mod target_tests {
        use super::*;

        #[test]
        fn test_feature_validity() {
            assert!(FeatureInfo::new("Login").is_valid());
            assert!(FeatureInfo::default().with_filename("a.feature").is_valid());
            assert!(!FeatureInfo::default().is_valid());
        }

        #[test]
        fn test_step_origin() {
            assert!(StepInfo::new("x").at("features/login.feature", 4).is_from_feature_file());
            assert!(!StepInfo::new("x").at("steps/login.rs", 4).is_from_feature_file());
            assert!(!StepInfo::new("x").is_from_feature_file());
            assert!(!StepInfo::default().is_valid());
            assert!(StepInfo::default().with_step_type("given").is_valid());
        }

        #[test]
        fn test_scenario_failure() {
            assert!(ScenarioInfo::new("s").with_status(ScenarioStatus::Failed).failed());
            assert!(ScenarioInfo::new("s").with_status(ScenarioStatus::Error).failed());
            assert!(!ScenarioInfo::new("s").with_status(ScenarioStatus::Passed).failed());
            assert!(!ScenarioInfo::new("s").failed());
            assert_eq!("failed".parse(), Ok(ScenarioStatus::Failed));
        }

        #[test]
        fn test_formatter_specified() {
            assert!(!HostParams::default().formatter_specified());
            let params = HostParams {
                formatter: Some("html".to_string()),
                dry_run: false,
            };
            assert!(params.formatter_specified());
        }

        #[test]
        fn test_hook_arg_accessors() {
            let context = ExecutionContext::default().shared();
            assert!(HookArg::Context(context).as_context().is_some());
            assert!(HookArg::Empty.as_context().is_none());
            let target = HookArg::Target(HookTarget::Scenario(ScenarioInfo::new("s")));
            assert!(target.as_target().is_some());
            assert!(target.as_context().is_none());
        }
    }
}
