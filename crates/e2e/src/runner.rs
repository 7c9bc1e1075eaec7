//! Run orchestrator - drives every selected environment through provision,
//! preview, readiness and the test suite, one at a time

use std::path::PathBuf;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{PreviewConfig, RunnerConfig};
use crate::environment::EnvironmentConfig;
use crate::error::{E2eError, E2eResult};
use crate::history::{RunHistoryStore, RunSession};
use crate::library::LibraryBuilder;
use crate::process::{PreviewProcess, ProcessState};
use crate::provision::Provisioner;
use crate::readiness::{await_ready, warm_up};
use crate::suite::{SuiteStatus, TestSuite};

/// Lifecycle of one environment within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Provisioning,
    Starting,
    Ready,
    TestsRunning,
    Completed,
    Failed,
}

/// Result of running a single environment
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentRunRecord {
    pub config: EnvironmentConfig,
    pub working_directory: PathBuf,
    pub state: RunState,

    /// Phase the environment was in when it failed
    pub failed_during: Option<RunState>,
    pub process_state: ProcessState,
    pub suite: Option<SuiteStatus>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl EnvironmentRunRecord {
    fn new(config: EnvironmentConfig, working_directory: PathBuf) -> Self {
        Self {
            config,
            working_directory,
            state: RunState::Pending,
            failed_during: None,
            process_state: ProcessState::Unstarted,
            suite: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Result of a whole session
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session: RunSession,
    pub records: Vec<EnvironmentRunRecord>,
    pub pruned: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state == RunState::Failed)
            .count()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip building and publishing the library
    pub skip_build: bool,

    /// A failing test suite fails the environment
    pub strict_suite: bool,
}

/// Sequential driver over the selected environments
pub struct RunOrchestrator {
    history: RunHistoryStore,
    builder: LibraryBuilder,
    provisioner: Provisioner,
    suite: TestSuite,
    preview: PreviewConfig,
    ready_pattern: Regex,
    keep_runs: usize,
}

impl RunOrchestrator {
    pub fn from_config(config: &RunnerConfig) -> E2eResult<Self> {
        Ok(Self {
            history: RunHistoryStore::new(config.runs_dir.clone()),
            builder: LibraryBuilder::new(
                config.project_root.clone(),
                config.library.package.clone(),
                config.library.build_steps.clone(),
            ),
            provisioner: Provisioner::new(&config.library, &config.preview),
            suite: TestSuite::new(config.suite_dir(), config.suite.command.clone()),
            preview: config.preview.clone(),
            ready_pattern: Regex::new(&config.preview.ready_pattern)?,
            keep_runs: config.keep_runs,
        })
    }

    pub fn history(&self) -> &RunHistoryStore {
        &self.history
    }

    /// Run `configs` in order. Only build and session failures are returned
    /// as errors; per-environment failures are recorded in the report.
    pub async fn run(
        &self,
        configs: &[EnvironmentConfig],
        options: &RunOptions,
    ) -> E2eResult<RunReport> {
        let start = Instant::now();

        if options.skip_build {
            info!("Skipping library build");
        } else {
            self.builder.build().await?;
        }

        let session = self.history.begin_session()?;

        if configs.is_empty() {
            warn!("No environments selected, nothing to run");
        }

        let mut records = Vec::with_capacity(configs.len());
        for config in configs {
            records.push(self.run_environment(&session, config, options).await);
        }

        let pruned = self.history.prune(self.keep_runs, Some(&session.directory));

        let report = RunReport {
            session,
            records,
            pruned,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!("");
        info!(
            "Environments: {} completed, {} failed ({} ms)",
            report.records.len() - report.failed(),
            report.failed(),
            report.duration_ms
        );

        if let Err(e) = self.write_report(&report) {
            warn!("Failed to write run report: {}", e);
        }

        Ok(report)
    }

    /// Run one environment. The preview process is terminated on every
    /// path out of here before the next environment may start.
    async fn run_environment(
        &self,
        session: &RunSession,
        config: &EnvironmentConfig,
        options: &RunOptions,
    ) -> EnvironmentRunRecord {
        let start = Instant::now();
        let mut record =
            EnvironmentRunRecord::new(config.clone(), session.directory.join(&config.name));
        let mut process = PreviewProcess::new(self.preview.shutdown_grace());

        info!("");
        info!(
            "⚙️  Creating {} app in {}",
            config.name,
            record.working_directory.display()
        );

        let outcome = self.drive(session, &mut record, &mut process, options).await;

        process.terminate().await;
        record.process_state = process.state();
        record.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                record.state = RunState::Completed;
                info!("✓ {} ({} ms)", config.name, record.duration_ms);
            }
            Err(e) => {
                error!("✗ {} - {}", config.name, e);
                record.failed_during = Some(record.state);
                record.state = RunState::Failed;
                record.error = Some(e.to_string());
            }
        }

        record
    }

    async fn drive(
        &self,
        session: &RunSession,
        record: &mut EnvironmentRunRecord,
        process: &mut PreviewProcess,
        options: &RunOptions,
    ) -> E2eResult<()> {
        record.state = RunState::Provisioning;
        let dir = session.environment_dir(&record.config.name)?;
        let preview_command = self.provisioner.provision(&record.config, &dir).await?;

        record.state = RunState::Starting;
        process.start(&preview_command, &dir)?;
        let lines = process
            .output()
            .ok_or_else(|| E2eError::Process("Preview output already consumed".into()))?;
        await_ready(lines, &self.ready_pattern, self.preview.ready_timeout()).await?;
        process.detach_output();

        record.state = RunState::Ready;
        warm_up(&self.preview.warm_up_url, self.preview.warm_up_timeout()).await;

        record.state = RunState::TestsRunning;
        let status = self.suite.run(&record.config.name).await?;
        record.suite = Some(status);

        if options.strict_suite && !status.passed() {
            return Err(E2eError::Suite(format!("{:?}", status)));
        }
        Ok(())
    }

    /// Write the session report next to the environment directories
    fn write_report(&self, report: &RunReport) -> E2eResult<PathBuf> {
        let path = report.session.directory.join("report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
