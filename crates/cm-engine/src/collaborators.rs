//! Collaborators consumed by the engine and their default implementations.
//!
//! The engine only talks to the outside world through these traits, plus the
//! [`FileScanner`] and [`FileStore`] from `cm-scanner`. All of them are
//! synchronous; the executor calls them on the blocking pool under a
//! timeout.
//!
//! | Trait | Default |
//! |-------|---------|
//! | [`BackupStore`] | [`SnapshotBackupStore`] copies touched files into a backup directory |
//! | [`DependencyManager`] | [`ManifestDependencyManager`] adds declared packages to a JSON manifest |
//! | [`ConfigUpdater`] | [`JsonConfigUpdater`] sets dotted keys in a JSON config |
//! | [`TestRunner`] | [`CommandTestRunner`] runs a command; [`FixedTestRunner`] reports fixed counts |
//! | [`Validator`] | [`BuiltinValidator`] |

use std::fmt;
use std::process::Command;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cm_core::{ExecutionPolicy, MigrationPlan, MigrationStep};
use cm_scanner::{FileScanner, FileStore, FsFileScanner, FsFileStore, MemoryFileStore, ScanError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::CollaboratorError;
use crate::validation::{BuiltinValidator, Validator};

/// Snapshots files before a run.
pub trait BackupStore: Send + Sync {
    /// Backs up every file the plan requires and returns the backup location.
    fn create_backup(&self, plan: &MigrationPlan) -> Result<String, CollaboratorError>;
}

/// Applies dependency-update steps.
pub trait DependencyManager: Send + Sync {
    /// Updates the manifest the step targets.
    fn update_manifest(&self, step: &MigrationStep) -> Result<(), CollaboratorError>;
}

/// Applies config-change steps.
pub trait ConfigUpdater: Send + Sync {
    /// Updates the configuration file the step targets.
    fn update_config(&self, step: &MigrationStep) -> Result<(), CollaboratorError>;
}

/// Pass/fail counts of a test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// Passed tests.
    pub passed: u32,
    /// Failed tests.
    pub failed: u32,
}

/// Runs the project's test suite.
pub trait TestRunner: Send + Sync {
    /// Runs the suite.
    fn run(&self) -> Result<TestReport, CollaboratorError>;
}

/// Copies every file in the plan's backup requirements to
/// `<backup_dir>/<plan id>/<path>` through a [`FileStore`].
///
/// Files that do not exist yet are skipped.
pub struct SnapshotBackupStore {
    store: Arc<dyn FileStore>,
    backup_dir: Utf8PathBuf,
}

impl SnapshotBackupStore {
    /// Creates a backup store writing below `backup_dir`.
    #[must_use]
    pub fn new(store: Arc<dyn FileStore>, backup_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            store,
            backup_dir: backup_dir.into(),
        }
    }
}

impl BackupStore for SnapshotBackupStore {
    fn create_backup(&self, plan: &MigrationPlan) -> Result<String, CollaboratorError> {
        let location = self.backup_dir.join(&plan.id);
        let mut copied = 0usize;

        for path in &plan.risk_assessment.backup_requirements {
            let content = match self.store.read(path) {
                Ok(content) => content,
                Err(ScanError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            self.store.write(&location.join(path), &content)?;
            copied += 1;
        }

        info!(plan_id = %plan.id, location = %location, files = copied, "Created backup");
        Ok(location.into_string())
    }
}

/// Ensures the packages a step declares are listed in a JSON manifest.
///
/// Declarations are `name` or `name@version`. A missing package is added to
/// `dependencies` with `^version` (or `*`); packages already present in any
/// dependency table are left alone.
pub struct ManifestDependencyManager {
    store: Arc<dyn FileStore>,
}

impl ManifestDependencyManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

/// Splits `name@version`, keeping the leading `@` of scoped packages.
fn split_package(decl: &str) -> (&str, Option<&str>) {
    match decl.rfind('@') {
        Some(at) if at > 0 => (&decl[..at], Some(&decl[at + 1..])),
        _ => (decl, None),
    }
}

const DEPENDENCY_TABLES: &[&str] = &[
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

impl DependencyManager for ManifestDependencyManager {
    fn update_manifest(&self, step: &MigrationStep) -> Result<(), CollaboratorError> {
        let path = &step.file_path;
        let mut manifest = read_json_object(self.store.as_ref(), path)?;

        let mut added = Vec::new();
        for decl in &step.dependencies {
            let (name, version) = split_package(decl);
            let listed = DEPENDENCY_TABLES.iter().any(|table| {
                manifest
                    .get(*table)
                    .and_then(Value::as_object)
                    .is_some_and(|deps| deps.contains_key(name))
            });
            if listed {
                continue;
            }

            let deps = manifest
                .entry("dependencies")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| CollaboratorError::json(path, "\"dependencies\" is not an object"))?;
            let range = version.map_or_else(|| "*".to_owned(), |v| format!("^{v}"));
            deps.insert(name.to_owned(), Value::String(range));
            added.push(name);
        }

        write_json_object(self.store.as_ref(), path, manifest)?;
        debug!(path = %path, added = ?added, "Updated manifest");
        Ok(())
    }
}

/// Sets dotted keys from the step's params in a JSON configuration file.
///
/// Values that parse as JSON (`true`, `3`, `["a"]`) are stored typed; all
/// others are stored as strings. A missing file starts out as `{}`.
pub struct JsonConfigUpdater {
    store: Arc<dyn FileStore>,
}

impl JsonConfigUpdater {
    /// Creates an updater over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

impl ConfigUpdater for JsonConfigUpdater {
    fn update_config(&self, step: &MigrationStep) -> Result<(), CollaboratorError> {
        let path = &step.file_path;
        let mut root = match read_json_object(self.store.as_ref(), path) {
            Err(CollaboratorError::Scan(ScanError::NotFound(_))) => Map::new(),
            other => other?,
        };

        for (key, raw) in &step.params {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            set_dotted(&mut root, key, value)
                .map_err(|segment| CollaboratorError::json(path, format!("'{segment}' is not an object")))?;
        }

        write_json_object(self.store.as_ref(), path, root)?;
        debug!(path = %path, keys = step.params.len(), "Updated config");
        Ok(())
    }
}

/// Sets `a.b.c` in `root`, creating intermediate objects.
///
/// Returns the offending segment if an intermediate value is not an object.
fn set_dotted(root: &mut Map<String, Value>, key: &str, value: Value) -> Result<(), String> {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return Ok(());
    };

    let mut current = root;
    for segment in segments {
        current = current
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| segment.to_owned())?;
    }
    current.insert(last.to_owned(), value);
    Ok(())
}

fn read_json_object(
    store: &dyn FileStore,
    path: &Utf8Path,
) -> Result<Map<String, Value>, CollaboratorError> {
    let content = store.read(path)?;
    match serde_json::from_str(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CollaboratorError::json(path, "top level is not an object")),
        Err(e) => Err(CollaboratorError::json(path, e)),
    }
}

fn write_json_object(
    store: &dyn FileStore,
    path: &Utf8Path,
    map: Map<String, Value>,
) -> Result<(), CollaboratorError> {
    let mut content =
        serde_json::to_string_pretty(&Value::Object(map)).map_err(|e| CollaboratorError::json(path, e))?;
    content.push('\n');
    store.write(path, &content)?;
    Ok(())
}

/// Runs an external command as the test suite.
///
/// The whole command counts as one test: exit status zero is one pass,
/// anything else one failure.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    program: String,
    args: Vec<String>,
    cwd: Option<Utf8PathBuf>,
}

impl CommandTestRunner {
    /// Creates a runner for `program args...`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
            cwd: None,
        }
    }

    /// Runs the command in `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TestRunner for CommandTestRunner {
    fn run(&self) -> Result<TestReport, CollaboratorError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| CollaboratorError::Process {
            command: self.command_line(),
            source,
        })?;
        debug!(command = %self.command_line(), status = %output.status, "Test command finished");

        Ok(if output.status.success() {
            TestReport { passed: 1, failed: 0 }
        } else {
            TestReport { passed: 0, failed: 1 }
        })
    }
}

/// Reports the same counts on every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedTestRunner(TestReport);

impl FixedTestRunner {
    /// Creates a runner reporting `passed` and `failed`.
    #[must_use]
    pub const fn new(passed: u32, failed: u32) -> Self {
        Self(TestReport { passed, failed })
    }
}

impl TestRunner for FixedTestRunner {
    fn run(&self) -> Result<TestReport, CollaboratorError> {
        Ok(self.0)
    }
}

/// The full set of collaborators an engine uses.
#[derive(Clone)]
pub struct Collaborators {
    /// Resolves the file set.
    pub scanner: Arc<dyn FileScanner>,
    /// Reads and writes file content.
    pub store: Arc<dyn FileStore>,
    /// Creates pre-run backups.
    pub backup: Arc<dyn BackupStore>,
    /// Applies dependency-update steps.
    pub dependencies: Arc<dyn DependencyManager>,
    /// Applies config-change steps.
    pub config: Arc<dyn ConfigUpdater>,
    /// Runs the post-migration test phase.
    pub tests: Arc<dyn TestRunner>,
    /// Checks step validation rules.
    pub validator: Arc<dyn Validator>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Default collaborators for the project at `root`.
    ///
    /// The test phase runs `npm test` in `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if `root` is not a directory.
    pub fn filesystem(root: &Utf8Path, policy: &ExecutionPolicy) -> Result<Self, ScanError> {
        let scanner: Arc<dyn FileScanner> = Arc::new(FsFileScanner::new(root)?);
        let store: Arc<dyn FileStore> = Arc::new(FsFileStore::new(root));
        Ok(Self::with_store(
            scanner,
            store,
            policy,
            Arc::new(CommandTestRunner::new("npm", &["test"]).in_dir(root)),
        ))
    }

    /// Collaborators over an in-memory project. The test phase reports no tests.
    #[must_use]
    pub fn in_memory(files: &Arc<MemoryFileStore>, policy: &ExecutionPolicy) -> Self {
        let scanner: Arc<dyn FileScanner> = Arc::clone(files) as Arc<dyn FileScanner>;
        let store: Arc<dyn FileStore> = Arc::clone(files) as Arc<dyn FileStore>;
        Self::with_store(scanner, store, policy, Arc::new(FixedTestRunner::default()))
    }

    fn with_store(
        scanner: Arc<dyn FileScanner>,
        store: Arc<dyn FileStore>,
        policy: &ExecutionPolicy,
        tests: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            scanner,
            backup: Arc::new(SnapshotBackupStore::new(
                Arc::clone(&store),
                policy.backup_dir.clone(),
            )),
            dependencies: Arc::new(ManifestDependencyManager::new(Arc::clone(&store))),
            config: Arc::new(JsonConfigUpdater::new(Arc::clone(&store))),
            store,
            tests,
            validator: Arc::new(BuiltinValidator),
        }
    }

    /// Replaces the test runner.
    #[must_use]
    pub fn with_test_runner(mut self, tests: Arc<dyn TestRunner>) -> Self {
        self.tests = tests;
        self
    }

    /// Replaces the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the dependency manager.
    #[must_use]
    pub fn with_dependency_manager(mut self, dependencies: Arc<dyn DependencyManager>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Replaces the config updater.
    #[must_use]
    pub fn with_config_updater(mut self, config: Arc<dyn ConfigUpdater>) -> Self {
        self.config = config;
        self
    }

    /// Replaces the backup store.
    #[must_use]
    pub fn with_backup_store(mut self, backup: Arc<dyn BackupStore>) -> Self {
        self.backup = backup;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::StepType;

    fn memory(files: &[(&str, &str)]) -> Arc<MemoryFileStore> {
        Arc::new(MemoryFileStore::with_files(files.iter().copied()))
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("react@18"), ("react", Some("18")));
        assert_eq!(split_package("@testing-library/react"), ("@testing-library/react", None));
        assert_eq!(split_package("@types/node@20"), ("@types/node", Some("20")));
        assert_eq!(split_package("lodash"), ("lodash", None));
    }

    #[test]
    fn test_manifest_manager_adds_missing_only() {
        let files = memory(&[(
            "package.json",
            r#"{"dependencies": {"react": "^18.2.0"}}"#,
        )]);
        let manager = ManifestDependencyManager::new(Arc::clone(&files) as Arc<dyn FileStore>);
        let mut step = MigrationStep::new("d", StepType::DependencyUpdate, "package.json");
        step.dependencies = vec!["react@18".to_owned(), "@testing-library/react".to_owned()];

        manager.update_manifest(&step).unwrap();

        let manifest: Value = serde_json::from_str(&files.get("package.json").unwrap()).unwrap();
        assert_eq!(manifest["dependencies"]["react"], "^18.2.0");
        assert_eq!(manifest["dependencies"]["@testing-library/react"], "*");
    }

    #[test]
    fn test_manifest_manager_rejects_non_object() {
        let files = memory(&[("package.json", "[1, 2]")]);
        let manager = ManifestDependencyManager::new(Arc::clone(&files) as Arc<dyn FileStore>);
        let step = MigrationStep::new("d", StepType::DependencyUpdate, "package.json");

        assert!(matches!(
            manager.update_manifest(&step),
            Err(CollaboratorError::Json { .. })
        ));
    }

    #[test]
    fn test_config_updater_creates_missing_file() {
        let files = memory(&[]);
        let updater = JsonConfigUpdater::new(Arc::clone(&files) as Arc<dyn FileStore>);
        let mut step = MigrationStep::new("c", StepType::ConfigChange, "tsconfig.json");
        step.params.insert("codemig.targetVersion".to_owned(), "18.2.0".to_owned());
        step.params.insert("compilerOptions.strict".to_owned(), "true".to_owned());

        updater.update_config(&step).unwrap();

        let config: Value = serde_json::from_str(&files.get("tsconfig.json").unwrap()).unwrap();
        assert_eq!(config["codemig"]["targetVersion"], "18.2.0");
        assert_eq!(config["compilerOptions"]["strict"], true);
    }

    #[test]
    fn test_set_dotted_rejects_scalar_parent() {
        let mut root = Map::new();
        root.insert("a".to_owned(), Value::from(1));
        assert_eq!(set_dotted(&mut root, "a.b", Value::from(2)), Err("a".to_owned()));
    }

    #[test]
    fn test_snapshot_backup_copies_existing_files() {
        let files = memory(&[("src/a.js", "var a;")]);
        let backup = SnapshotBackupStore::new(Arc::clone(&files) as Arc<dyn FileStore>, ".codemig/backups");
        let plan: MigrationPlan = serde_json::from_value(serde_json::json!({
            "id": "plan-1",
            "created_at": "2024-01-01T00:00:00Z",
            "config": {},
            "steps": [],
            "risk_assessment": {
                "overall_risk": "low",
                "critical_steps": 0,
                "rollback_complexity": 5,
                "estimated_downtime": 0,
                "backup_requirements": ["src/a.js", "src/missing.js"]
            },
            "impact": {
                "files_affected": 0,
                "lines_of_code_changed": 0,
                "breaking_changes": 0,
                "deprecated_features": [],
                "new_features": []
            },
            "validation": {
                "test_coverage": 0.0,
                "performance_impact": "none",
                "compatibility": {},
                "security": "clean"
            },
            "schedule": {"estimated_duration": 0, "milestones": [], "rollback_points": []}
        }))
        .unwrap();

        let location = backup.create_backup(&plan).unwrap();
        assert_eq!(location, ".codemig/backups/plan-1");
        assert_eq!(
            files.get(".codemig/backups/plan-1/src/a.js").as_deref(),
            Some("var a;")
        );
    }

    #[test]
    fn test_command_runner_counts_exit_status() {
        let passing = CommandTestRunner::new("true", &[]);
        assert_eq!(passing.run().unwrap(), TestReport { passed: 1, failed: 0 });

        let failing = CommandTestRunner::new("false", &[]);
        assert_eq!(failing.run().unwrap(), TestReport { passed: 0, failed: 1 });

        let missing = CommandTestRunner::new("definitely-not-a-command-xyz", &[]);
        assert!(matches!(missing.run(), Err(CollaboratorError::Process { .. })));
    }
}
