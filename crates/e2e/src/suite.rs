//! External browser test suite

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::E2eResult;
use crate::shell;

/// Outcome of one suite invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuiteStatus {
    Passed,
    Failed { code: Option<i32> },
}

impl SuiteStatus {
    pub fn passed(&self) -> bool {
        matches!(self, SuiteStatus::Passed)
    }
}

/// Runs the browser tests against whichever preview server is up
#[derive(Debug, Clone)]
pub struct TestSuite {
    dir: PathBuf,
    command: String,
}

impl TestSuite {
    pub fn new(dir: PathBuf, command: impl Into<String>) -> Self {
        Self {
            dir,
            command: command.into(),
        }
    }

    /// Run the suite for `env_name`, exposed to it as `E2E_ENVIRONMENT`
    pub async fn run(&self, env_name: &str) -> E2eResult<SuiteStatus> {
        info!("🏃 Running test suite for {}", env_name);

        let status = shell::sh(&self.command, &self.dir)
            .env("E2E_ENVIRONMENT", env_name)
            .status()
            .await?;

        if status.success() {
            Ok(SuiteStatus::Passed)
        } else {
            warn!("Test suite for {} {}", env_name, shell::describe(status));
            Ok(SuiteStatus::Failed {
                code: status.code(),
            })
        }
    }
}
