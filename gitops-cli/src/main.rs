// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

mod cli;

use anyhow::{bail, Context as _, Result};
use clap::{CommandFactory, Parser};
use rustls::crypto::aws_lc_rs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use gitops_common::config::{AppConfig, AppConfigBuilder, LoggingConfig};
use gitops_common::telemetry::{debug, error, info, setup_logging};
use gitops_engine::cluster::{kubernetes::{resolve_config_path, KubeConnector}, ClusterRegistry};
use gitops_engine::plan::reconciler::Reconciler;
use gitops_engine::secret::{decrypt::{Decryptor, SopsDecryptor}, loader::{Scope, SecretLoader}};
use gitops_engine::state::{ClusterState, StateStore};

use crate::cli::{CliArgs, ClustersCommand, Commands, PlanArgs, SecretsCommand};

fn load_config(args: &CliArgs) -> Result<AppConfig, figment::Error> {
    let mut builder = AppConfigBuilder::default();
    if let Some(path) = args.config.as_deref() {
        builder.with_file(path);
    }
    builder
        .with_env()
        .with_override_option("root_dir", args.root_dir.as_deref())
        .with_override_option("kubeconfig", args.kubeconfig.as_deref())
        .with_override_value("parallelism", args.parallelism)
        .with_override_value("cleartext", args.cleartext.then_some(true))
        .build()
}

/// Configured root, otherwise the top level of the enclosing git repository
async fn root_dir(config: &AppConfig) -> Result<PathBuf> {
    if let Some(root) = config.root_dir.as_deref().filter(|r| !r.is_empty()) {
        return Ok(PathBuf::from(root));
    }

    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        bail!("not inside a git repository, pass --root-dir");
    }

    Ok(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()))
}

/// Everything a command needs, built from configuration
struct Workspace {
    root: PathBuf,
    config: AppConfig,
}

impl Workspace {
    async fn new(config: AppConfig) -> Result<Self> {
        let root = root_dir(&config).await?;
        debug!(event = "RootDir", path = %root.display());
        Ok(Self { root, config })
    }

    fn state(&self) -> Result<StateStore> {
        let path = self.root.join(&self.config.state_file);
        StateStore::load(&path).with_context(|| format!("failed to load state from {}", path.display()))
    }

    fn decryptor(&self) -> Result<Arc<dyn Decryptor>> {
        Ok(Arc::new(SopsDecryptor::new(&self.config.sops.binary)?))
    }

    fn connector(&self, decryptor: Arc<dyn Decryptor>) -> KubeConnector {
        KubeConnector::new(&self.root, self.config.kubeconfig.as_deref().map(PathBuf::from), decryptor)
    }

    async fn reconciler(&self) -> Result<Reconciler> {
        let decryptor = self.decryptor()?;
        let loader = SecretLoader::new(&self.root, decryptor.clone(), self.config.effective_parallelism());
        let reconciler = Reconciler::connect(self.state()?, &self.connector(decryptor), loader).await?;
        Ok(reconciler)
    }
}

async fn confirm() -> Result<bool> {
    println!("Do you want to apply these changes? Only 'yes' will be accepted to approve.");
    print!("Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await?;
    Ok(answer.trim() == "yes")
}

async fn secrets(workspace: &Workspace, args: &PlanArgs, apply: bool, auto_approve: bool) -> Result<()> {
    let target_type = args.target_type.parse()?;
    let scope = Scope::new(args.dir.as_deref(), args.cluster.as_deref());
    if let Some(cluster) = &scope.cluster {
        println!("Limiting to cluster {}", cluster);
    }
    if let Some(dir) = &scope.directory {
        println!("Limiting to directory {}", dir);
    }

    let mut reconciler = workspace.reconciler().await?;
    let plan = reconciler.build_plan(target_type, &scope).await?;
    print!("{}", plan.render(args.show_unchanged, workspace.config.cleartext));

    if !apply {
        return Ok(());
    }

    // New declarations without changes still need their identity recorded
    if plan.nothing_to_do() {
        reconciler.state().save()?;
        return Ok(());
    }

    if !auto_approve && !confirm().await? {
        println!("Apply cancelled.");
        return Ok(());
    }

    plan.execute(reconciler.registry(), workspace.config.effective_parallelism())
        .await
        .context("apply did not complete, re-run to converge")?;
    reconciler.state().save()?;

    println!("Apply complete.");
    Ok(())
}

async fn clusters(workspace: &Workspace, cmd: &ClustersCommand) -> Result<()> {
    let mut state = workspace.state()?;

    match cmd {
        ClustersCommand::List => {
            if state.clusters().next().is_none() {
                println!("No clusters configured");
            }
            for cluster in state.clusters() {
                println!("{} => {}", cluster.name, cluster.config_file);
            }
        }
        ClustersCommand::Add { name, config_file } => {
            let resolved = resolve_config_path(&workspace.root, config_file);
            if !resolved.is_file() {
                bail!("kubeconfig {} not found", resolved.display());
            }
            state.add_cluster(ClusterState { name: name.clone(), config_file: config_file.clone() })?;
            state.save()?;
            println!("Added cluster {}", name);
        }
        ClustersCommand::Remove { name } => {
            state.remove_cluster(name)?;
            state.save()?;
            println!("Removed cluster {}", name);
        }
        ClustersCommand::Test { name } => {
            let decryptor = workspace.decryptor()?;
            let registry = ClusterRegistry::init_clusters(&workspace.connector(decryptor), state.clusters()).await?;

            for (cluster, result) in registry.test_connections().await {
                if name.as_ref().is_some_and(|name| *name != cluster) {
                    continue;
                }
                match result {
                    Ok(version) => println!("Cluster: {} ({})\tConnected: true", cluster, version),
                    Err(e) => println!("Cluster: {}\tConnected: false ({})", cluster, e),
                }
            }
            if let Some(name) = name {
                registry.client(name)?;
            }
        }
    }

    Ok(())
}

async fn run(args: CliArgs, config: AppConfig) -> Result<()> {
    let Some(cmd) = &args.cmd else {
        CliArgs::command().print_help()?;
        process::exit(1);
    };

    info!(event = "Starting", version = env!("CARGO_PKG_VERSION"));
    let workspace = Workspace::new(config).await?;

    match cmd {
        Commands::Secrets { cmd: SecretsCommand::Plan(plan) } => secrets(&workspace, plan, false, false).await,
        Commands::Secrets { cmd: SecretsCommand::Apply { plan, auto_approve } } => {
            secrets(&workspace, plan, true, *auto_approve).await
        }
        Commands::Clusters { cmd } => clusters(&workspace, cmd).await,
    }
}

#[tokio::main]
async fn main() {
    // Install the default aws_lc_rs crypto provider
    let _ = aws_lc_rs::default_provider().install_default();

    let args = CliArgs::parse();

    // Load configuration
    let config = load_config(&args).unwrap_or_else(|e| {
        setup_logging(&LoggingConfig::default(), args.verbose);
        error!(
            event = "Error",
            error = %e,
        );
        process::exit(1);
    });

    setup_logging(&config.logging, args.verbose);

    if let Err(e) = run(args, config).await {
        error!(
            event = "Error",
            error = %format!("{:#}", e),
        );
        process::exit(1);
    }
}
