//! Preview E2E runner entry point
//!
//! Run with: preview-e2e [--skip-build] [--only=<environment>]

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use preview_e2e::{E2eResult, RunOptions, RunOrchestrator, RunnerConfig};

#[derive(Parser, Debug)]
#[command(name = "preview-e2e")]
#[command(about = "Validate the library against freshly bootstrapped app environments")]
#[command(version)]
struct Args {
    /// Skip building and publishing the library
    #[arg(long, num_args = 0..=1, require_equals = true, default_value_t = false, default_missing_value = "true", action = ArgAction::Set)]
    skip_build: bool,

    /// Run only the environment with this name
    #[arg(long)]
    only: Option<String>,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "e2e.toml")]
    config: PathBuf,

    /// Override the project root
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// Override the run history directory
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Number of session directories to keep
    #[arg(long)]
    keep_runs: Option<usize>,

    /// Fail an environment when its test suite fails
    #[arg(long, num_args = 0..=1, require_equals = true, default_value_t = false, default_missing_value = "true", action = ArgAction::Set)]
    strict_suite: bool,

    /// Print the environment catalog and exit
    #[arg(long, num_args = 0..=1, require_equals = true, default_value_t = false, default_missing_value = "true", action = ArgAction::Set)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_value_t = false, default_missing_value = "true", action = ArgAction::Set)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let mut config = RunnerConfig::load(&args.config)?;
    if let Some(root) = args.project_root {
        config.project_root = root;
    }
    if let Some(runs_dir) = args.runs_dir {
        config.runs_dir = runs_dir;
    }
    if let Some(keep_runs) = args.keep_runs {
        config.keep_runs = keep_runs;
    }

    let registry = config.registry()?;

    if args.list {
        for env in registry.list() {
            println!("{:<16} {}", env.name, env.bootstrap_command);
        }
        return Ok(true);
    }

    config.validate()?;

    let selected = registry.select(args.only.as_deref());
    match (&args.only, selected.is_empty()) {
        (Some(only), true) => warn!("No environment named {:?}, nothing will run", only),
        (Some(only), false) => info!("Restricting run to {}", only),
        (None, _) => {}
    }

    let options = RunOptions {
        skip_build: args.skip_build,
        strict_suite: args.strict_suite || config.suite.strict,
    };

    let orchestrator = RunOrchestrator::from_config(&config)?;
    let report = orchestrator.run(&selected, &options).await?;

    Ok(report.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&["preview-e2e"], false, None ; "no flags")]
    #[test_case(&["preview-e2e", "--skip-build"], true, None ; "skip build")]
    #[test_case(&["preview-e2e", "--only=redwood_ts"], false, Some("redwood_ts") ; "only with equals")]
    #[test_case(&["preview-e2e", "--only=next_js", "--skip-build"], true, Some("next_js") ; "order independent")]
    #[test_case(&["preview-e2e", "--skip-build=true"], true, None ; "boolean with value")]
    #[test_case(&["preview-e2e", "--skip-build=false", "--only", "next_ts"], false, Some("next_ts") ; "explicit false")]
    fn test_parse_flags(argv: &[&str], skip_build: bool, only: Option<&str>) {
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.skip_build, skip_build);
        assert_eq!(args.only.as_deref(), only);
    }

    #[test]
    fn test_every_boolean_flag_accepts_value() {
        let args = Args::try_parse_from([
            "preview-e2e",
            "--strict-suite=true",
            "--list",
            "--verbose=false",
        ])
        .unwrap();
        assert!(args.strict_suite);
        assert!(args.list);
        assert!(!args.verbose);
        assert!(!args.skip_build);
    }
}
