#[path = "../sermatec-mqtt-publish/logging.rs"]
mod logging;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use sermatec_release::archive::{create_archive, ArchiveSummary};
use sermatec_release::github::GithubReleaseStore;
use sermatec_release::{
    DirectoryReleaseStore, Pipeline, PipelineConfig, PipelineOutcome, PushEvent, ReleaseStore,
};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about = "Packages the Home Assistant component and publishes the development build", long_about = None)]
struct Cli {
    /// Log debug messages
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Only build the zip archive
    Package {
        /// Component directory, relative to the current directory
        #[arg(long, default_value = "custom_components/sermatec_inverter")]
        source: PathBuf,

        #[arg(long, default_value = "sermatec_inverter.zip")]
        output: PathBuf,
    },
    /// Run the whole release job for a push
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Branch that was pushed
    #[arg(long)]
    branch: String,

    /// Commit the push points at
    #[arg(long)]
    commit: String,

    /// Checkout root
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Keep releases in this directory
    #[arg(long, conflicts_with = "github", required_unless_present = "github")]
    store_dir: Option<PathBuf>,

    /// Publish to this GitHub repository (owner/name)
    #[arg(long)]
    github: Option<String>,

    /// Repository token; falls back to $GITHUB_TOKEN
    #[arg(long)]
    token: Option<String>,

    /// GitHub API base URL
    #[arg(long)]
    api_url: Option<String>,
}

/// Where `run` publishes to.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Directory(PathBuf),
    Github {
        repository: String,
        token: String,
        api_url: Option<String>,
    },
}

impl Target {
    /// `env_token` is the value of `$GITHUB_TOKEN`, used when `--token` is absent.
    fn from_args(args: &RunArgs, env_token: Option<String>) -> anyhow::Result<Self> {
        if let Some(dir) = &args.store_dir {
            return Ok(Target::Directory(dir.clone()));
        }
        let Some(repository) = &args.github else {
            bail!("either --store-dir or --github is required");
        };
        let token = args
            .token
            .clone()
            .or(env_token)
            .filter(|token| !token.trim().is_empty());
        let Some(token) = token else {
            bail!("--token or $GITHUB_TOKEN is required to publish to GitHub");
        };
        Ok(Target::Github {
            repository: repository.clone(),
            token,
            api_url: args.api_url.clone(),
        })
    }
}

fn package(root: &Path, source: &Path, output: &Path) -> anyhow::Result<ArchiveSummary> {
    let summary = create_archive(root, source, output)
        .with_context(|| format!("can't package {}", source.display()))?;
    info!("{} files, sha256 {}", summary.files, summary.sha256);
    Ok(summary)
}

fn run<S: ReleaseStore>(args: &RunArgs, store: S) -> anyhow::Result<PipelineOutcome> {
    let mut pipeline = Pipeline::new(PipelineConfig::new(&args.workspace), store);
    let outcome = pipeline.run(&PushEvent::new(&args.branch, &args.commit))?;
    match &outcome {
        PipelineOutcome::Skipped { branch } => info!("nothing to do for '{branch}'"),
        PipelineOutcome::Published(report) => info!(
            "release '{}' now points at {} with {} ({})",
            report.release.tag,
            report.commit,
            report.archive.path.display(),
            report.archive.sha256
        ),
    }
    Ok(outcome)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.debug);

    match cli.command {
        Command::Package { source, output } => {
            let root = env::current_dir().context("can't determine the current directory")?;
            package(&root, &source, &output)?;
        }
        Command::Run(args) => match Target::from_args(&args, env::var("GITHUB_TOKEN").ok())? {
            Target::Directory(dir) => {
                run(&args, DirectoryReleaseStore::new(dir))?;
            }
            Target::Github {
                repository,
                token,
                api_url,
            } => {
                let mut store = GithubReleaseStore::new(&repository, &token)?;
                if let Some(url) = &api_url {
                    store = store.with_api_base_url(url);
                }
                run(&args, store)?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    fn run_args(extra: &[&str]) -> Result<RunArgs, clap::Error> {
        let mut argv = vec![
            "sermatec-release",
            "run",
            "--branch",
            "master",
            "--commit",
            COMMIT,
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv)?.command {
            Command::Run(args) => Ok(args),
            Command::Package { .. } => panic!("parsed as package"),
        }
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let component = dir.path().join("custom_components/sermatec_inverter");
        fs::create_dir_all(&component).unwrap();
        fs::write(component.join("manifest.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn store_dir_and_github_are_exclusive() {
        assert!(run_args(&["--store-dir", "out", "--github", "owner/repo"]).is_err());
        assert!(run_args(&[]).is_err());
        assert!(run_args(&["--store-dir", "out"]).is_ok());
    }

    #[test]
    fn token_falls_back_to_the_environment() {
        let args = run_args(&["--github", "owner/repo"]).unwrap();
        assert_eq!(
            Target::from_args(&args, Some("from-env".to_string())).unwrap(),
            Target::Github {
                repository: "owner/repo".to_string(),
                token: "from-env".to_string(),
                api_url: None,
            }
        );
        assert!(Target::from_args(&args, None).is_err());
        assert!(Target::from_args(&args, Some(" ".to_string())).is_err());

        let args = run_args(&[
            "--github",
            "owner/repo",
            "--token",
            "from-flag",
            "--api-url",
            "http://localhost:1234",
        ])
        .unwrap();
        let Target::Github { token, api_url, .. } =
            Target::from_args(&args, Some("from-env".to_string())).unwrap()
        else {
            panic!("expected a GitHub target");
        };
        assert_eq!(token, "from-flag");
        assert_eq!(api_url.as_deref(), Some("http://localhost:1234"));
    }

    #[test]
    fn package_writes_the_archive() {
        let workspace = workspace();
        let output = workspace.path().join("sermatec_inverter.zip");
        let summary = package(
            workspace.path(),
            Path::new("custom_components/sermatec_inverter"),
            &output,
        )
        .unwrap();
        assert_eq!(summary.files, 1);
        assert!(output.exists());

        assert!(package(workspace.path(), Path::new("missing"), &output).is_err());
    }

    #[test]
    fn run_publishes_into_the_store_dir() {
        let workspace = workspace();
        let releases = TempDir::new().unwrap();
        let args = run_args(&[
            "--workspace",
            workspace.path().to_str().unwrap(),
            "--store-dir",
            releases.path().to_str().unwrap(),
        ])
        .unwrap();

        let Target::Directory(dir) = Target::from_args(&args, None).unwrap() else {
            panic!("expected a directory target");
        };
        let outcome = run(&args, DirectoryReleaseStore::new(&dir)).unwrap();
        assert!(matches!(outcome, PipelineOutcome::Published(_)));

        let store = DirectoryReleaseStore::new(releases.path());
        let release = store.get("latest").unwrap().unwrap();
        assert_eq!(release.commit, COMMIT);
        assert!(release.get_asset("sermatec_inverter.zip").is_some());
    }

    #[test]
    fn run_skips_other_branches() {
        let workspace = workspace();
        let releases = TempDir::new().unwrap();
        let mut args = run_args(&[
            "--workspace",
            workspace.path().to_str().unwrap(),
            "--store-dir",
            releases.path().to_str().unwrap(),
        ])
        .unwrap();
        args.branch = "feature".to_string();

        let outcome = run(&args, DirectoryReleaseStore::new(releases.path())).unwrap();
        assert!(matches!(outcome, PipelineOutcome::Skipped { .. }));
        assert!(DirectoryReleaseStore::new(releases.path())
            .get("latest")
            .unwrap()
            .is_none());
    }
}
