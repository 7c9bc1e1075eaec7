//! Preview E2E Runner
//!
//! Validates a library against several freshly bootstrapped application
//! environments. For each environment the runner:
//! - scaffolds a new app in its own session directory and links the library
//! - spawns the library's preview server in a dedicated process group
//! - waits for the readiness marker on the server's output, then warms the
//!   data endpoint
//! - hands off to the external browser test suite
//! - tears the preview server down before moving on
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RunOrchestrator                                            │
//! │    ├── LibraryBuilder::build()          (skippable)         │
//! │    ├── RunHistoryStore::begin_session() -> RunSession       │
//! │    ├── for each EnvironmentConfig (sequential):             │
//! │    │     ├── Provisioner::provision(env, dir)               │
//! │    │     ├── PreviewProcess::start(command, dir)            │
//! │    │     ├── await_ready(lines, pattern, timeout)           │
//! │    │     ├── warm_up(url)                                   │
//! │    │     ├── TestSuite::run(env)                            │
//! │    │     └── PreviewProcess::terminate()   (always)         │
//! │    └── RunHistoryStore::prune(cap)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod history;
pub mod library;
pub mod process;
pub mod provision;
pub mod readiness;
pub mod runner;
pub mod shell;
pub mod suite;

pub use config::RunnerConfig;
pub use environment::{EnvironmentConfig, EnvironmentRegistry};
pub use error::{E2eError, E2eResult};
pub use runner::{RunOptions, RunOrchestrator, RunReport, RunState};
