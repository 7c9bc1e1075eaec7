//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::environment::{default_environments, EnvironmentConfig, EnvironmentRegistry};
use crate::error::{E2eError, E2eResult};

/// Top-level runner configuration, loadable from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Root of the library's repository
    pub project_root: PathBuf,

    /// Where session directories are created (relative paths resolve
    /// against the current directory)
    pub runs_dir: PathBuf,

    /// Number of session directories to retain
    pub keep_runs: usize,

    /// Library under test
    pub library: LibraryConfig,

    /// Preview server
    pub preview: PreviewConfig,

    /// External browser test suite
    pub suite: SuiteConfig,

    /// Environment catalog
    pub environments: Vec<EnvironmentConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            runs_dir: PathBuf::from("runs"),
            keep_runs: 5,
            library: LibraryConfig::default(),
            preview: PreviewConfig::default(),
            suite: SuiteConfig::default(),
            environments: default_environments(),
        }
    }
}

/// How the library is built and linked into each environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Package name as published locally
    pub package: String,

    /// Expected `name` in the project root's package.json (None = skip check)
    pub expected_root_package: Option<String>,

    /// Commands run in the project root to build and publish the library
    pub build_steps: Vec<String>,

    /// Command run in each environment to add the locally built library
    pub link_command: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            package: "mailing".to_string(),
            expected_root_package: Some("mailing-monorepo".to_string()),
            build_steps: vec![
                "npx yalc remove".to_string(),
                "npx yalc add".to_string(),
                "yarn build".to_string(),
                "npx yalc push".to_string(),
            ],
            link_command: "npx yalc add mailing".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Command that starts the preview server inside an environment
    pub command: String,

    /// Regex matched against each output line to detect readiness
    pub ready_pattern: String,

    /// Data endpoint requested once after readiness
    pub warm_up_url: String,

    /// Upper bound on the readiness wait
    pub ready_timeout_secs: u64,

    /// Upper bound on the warm-up request
    pub warm_up_timeout_secs: u64,

    /// Time allowed between SIGINT and SIGKILL on teardown
    pub shutdown_grace_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            command: r#"npx mailing --quiet --typescript --emails-dir="./emails""#.to_string(),
            ready_pattern: r"Running preview at http://localhost:3883/".to_string(),
            warm_up_url: "http://localhost:3883/previews.json".to_string(),
            ready_timeout_secs: 120,
            warm_up_timeout_secs: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl PreviewConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn warm_up_timeout(&self) -> Duration {
        Duration::from_secs(self.warm_up_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Suite directory (relative paths resolve against the project root)
    pub dir: PathBuf,

    /// Command that runs the browser tests
    pub command: String,

    /// Mark an environment failed when the suite fails
    pub strict: bool,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("packages/cli/cypress"),
            command: "yarn cypress run".to_string(),
            strict: false,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when missing
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Absolute path of the suite directory
    pub fn suite_dir(&self) -> PathBuf {
        self.project_root.join(&self.suite.dir)
    }

    /// Build the immutable environment registry from this config
    pub fn registry(&self) -> E2eResult<EnvironmentRegistry> {
        EnvironmentRegistry::new(self.environments.clone())
    }

    /// Check everything that must hold before any environment runs
    pub fn validate(&self) -> E2eResult<()> {
        if !self.project_root.is_dir() {
            return Err(E2eError::Configuration(format!(
                "Check that project root exists: {}",
                self.project_root.display()
            )));
        }

        if let Some(expected) = &self.library.expected_root_package {
            let package_json = self.project_root.join("package.json");
            let name = std::fs::read_to_string(&package_json)
                .ok()
                .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
                .and_then(|value| value.get("name").and_then(|n| n.as_str()).map(String::from));
            if name.as_deref() != Some(expected.as_str()) {
                return Err(E2eError::Configuration(format!(
                    "Check that project root is the {} root: {}",
                    expected,
                    self.project_root.display()
                )));
            }
        }

        let suite_dir = self.suite_dir();
        if !suite_dir.is_dir() {
            return Err(E2eError::Configuration(format!(
                "Check that suite directory exists: {}",
                suite_dir.display()
            )));
        }

        regex::Regex::new(&self.preview.ready_pattern)?;
        self.registry()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(name: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            format!(r#"{{"name": "{}", "private": true}}"#, name),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("packages/cli/cypress")).unwrap();
        dir
    }

    fn config_for(root: &Path) -> RunnerConfig {
        RunnerConfig {
            project_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RunnerConfig::load(&dir.path().join("e2e.toml")).unwrap();
        assert_eq!(config.keep_runs, 5);
        assert_eq!(config.environments.len(), 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e2e.toml");
        std::fs::write(
            &path,
            r#"
keep_runs = 2

[preview]
ready_timeout_secs = 10

[[environments]]
name = "vite_ts"
bootstrap_command = "yarn create vite . --template react-ts"
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.keep_runs, 2);
        assert_eq!(config.preview.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.preview.warm_up_url, "http://localhost:3883/previews.json");
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.environments[0].name, "vite_ts");
    }

    #[test]
    fn test_validate_accepts_project_root() {
        let root = project("mailing-monorepo");
        config_for(root.path()).validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_package() {
        let root = project("something-else");
        let err = config_for(root.path()).validate().unwrap_err();
        assert!(matches!(err, E2eError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let root = TempDir::new().unwrap();
        let err = config_for(&root.path().join("nope")).validate().unwrap_err();
        assert!(matches!(err, E2eError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_missing_suite_dir() {
        let root = project("mailing-monorepo");
        let mut config = config_for(root.path());
        config.suite.dir = PathBuf::from("missing");
        assert!(config.validate().is_err());
    }
}
