//! Building and publishing the library under test

use std::path::PathBuf;

use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::shell::{self, Output};

#[derive(Debug, Clone)]
pub struct LibraryBuilder {
    project_root: PathBuf,
    package: String,
    steps: Vec<String>,
}

impl LibraryBuilder {
    pub fn new(project_root: PathBuf, package: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            project_root,
            package: package.into(),
            steps,
        }
    }

    /// Run every build step in the project root, stopping at the first failure
    pub async fn build(&self) -> E2eResult<()> {
        info!("🔨 Building {}...", self.package);

        for step in &self.steps {
            let status = shell::run(step, &self.project_root, Output::Quiet)
                .await
                .map_err(|e| E2eError::Build(format!("failed to run `{}`: {}", step, e)))?;
            if !status.success() {
                return Err(E2eError::Build(format!("`{}` {}", step, shell::describe(status))));
            }
        }

        Ok(())
    }
}
