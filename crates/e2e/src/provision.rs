//! Environment provisioning - scaffolding an app and linking the library

use std::path::Path;

use tracing::{debug, info};

use crate::config::{LibraryConfig, PreviewConfig};
use crate::environment::EnvironmentConfig;
use crate::error::{E2eError, E2eResult};
use crate::shell::{self, Output};

/// Populates an environment's working directory
#[derive(Debug, Clone)]
pub struct Provisioner {
    link_command: String,
    preview_command: String,
}

impl Provisioner {
    pub fn new(library: &LibraryConfig, preview: &PreviewConfig) -> Self {
        Self {
            link_command: library.link_command.clone(),
            preview_command: preview.command.clone(),
        }
    }

    /// Bootstrap the app in `dir` and link the library into it.
    ///
    /// Returns the command that starts the preview server; the caller owns
    /// the resulting subprocess.
    pub async fn provision(&self, env: &EnvironmentConfig, dir: &Path) -> E2eResult<String> {
        info!("Bootstrapping {} in {}", env.name, dir.display());
        self.step(env, &env.bootstrap_command, dir).await?;

        debug!("Linking library into {}", env.name);
        self.step(env, &self.link_command, dir).await?;

        Ok(self.preview_command.clone())
    }

    async fn step(&self, env: &EnvironmentConfig, command: &str, dir: &Path) -> E2eResult<()> {
        let status = shell::run(command, dir, Output::Quiet)
            .await
            .map_err(|e| E2eError::Provision {
                env: env.name.clone(),
                reason: format!("failed to run `{}`: {}", command, e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(E2eError::Provision {
                env: env.name.clone(),
                reason: format!("`{}` {}", command, shell::describe(status)),
            })
        }
    }
}
