// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[
    clap(
        name = "gitops",
        version,
        author,
        about = "Reconcile encrypted secret declarations into Kubernetes clusters"
    )
]
pub struct CliArgs {
    /// Root directory of the git repository
    #[clap(long, global = true, env = "GITOPS_ROOT_DIR")]
    pub root_dir: Option<String>,
    /// Kubeconfig for the default cluster
    #[clap(short = 'k', long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,
    /// Configuration file (yaml or json)
    #[clap(short, long, global = true, env = "GITOPS_CONFIG")]
    pub config: Option<String>,
    /// Number of concurrent workers
    #[clap(short, long, global = true)]
    pub parallelism: Option<usize>,
    /// Print secret values in cleartext
    #[clap(long, global = true)]
    pub cleartext: bool,
    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[clap(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[
        clap(
            name = "secrets",
            visible_alias = "s",
            about = "GitOps managed secrets"
        )
    ]
    Secrets {
        #[clap(subcommand)]
        cmd: SecretsCommand,
    },
    #[
        clap(
            name = "clusters",
            about = "Manage target clusters"
        )
    ]
    Clusters {
        #[clap(subcommand)]
        cmd: ClustersCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SecretsCommand {
    #[
        clap(
            name = "plan",
            visible_alias = "p",
            about = "Show the changes an apply would make"
        )
    ]
    Plan(PlanArgs),
    #[
        clap(
            name = "apply",
            visible_alias = "a",
            about = "Push secrets into the target clusters"
        )
    ]
    Apply {
        #[clap(flatten)]
        plan: PlanArgs,
        /// Apply without prompting for approval
        #[clap(long)]
        auto_approve: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Only reconcile secrets targeting this cluster
    pub cluster: Option<String>,
    /// Only reconcile secrets below this directory, relative to the root
    #[clap(short, long)]
    pub dir: Option<String>,
    /// Kind of target to reconcile
    #[clap(long, default_value = "k8s")]
    pub target_type: String,
    /// Also list secrets without changes
    #[clap(long)]
    pub show_unchanged: bool,
}

#[derive(Subcommand, Debug)]
pub enum ClustersCommand {
    #[clap(name = "list", about = "List the configured clusters")]
    List,
    #[clap(name = "add", about = "Add a target cluster")]
    Add {
        name: String,
        /// Kubeconfig file, optionally sops encrypted (*.kubeconfig.secret.enc.yaml)
        config_file: String,
    },
    #[clap(name = "remove", about = "Remove a target cluster")]
    Remove {
        name: String,
    },
    #[clap(name = "test", about = "Test the connection to the target clusters")]
    Test {
        name: Option<String>,
    },
}
