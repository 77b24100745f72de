//! CLI command definitions using clap.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use vscode_reconciler::{Backoff, ControllerConfig, ReconcilerConfig};

/// VS Code workload operator
#[derive(Parser, Debug)]
#[command(name = "vscode-operator")]
#[command(version)]
#[command(about = "Runs one VS Code workload per task execution")]
#[command(args_conflicts_with_subcommands = true)]
#[command(
    long_about = "Watches VsCode resources and creates the workload pod, its services and, when an ingress gateway is configured, its routing rules. Image, domain and gateway come from VS_CODE_IMAGE, ROOT_DOMAIN and ISTIO_INGRESS_GATEWAY."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Cli {
    /// Subcommand to run; `run` when none is given.
    pub fn command(self) -> Commands {
        self.command.unwrap_or(Commands::Run(self.run))
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the controller
    Run(RunArgs),

    /// Print the VsCode CustomResourceDefinition as YAML
    Crd,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Address for the /healthz and /readyz endpoints
    #[arg(long, env = "PROBE_ADDR", default_value = "0.0.0.0:8081")]
    pub probe_addr: SocketAddr,

    /// Only watch this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds to wait after creating the pod
    #[arg(long, default_value_t = 30)]
    pub pod_requeue_secs: u64,

    /// Seconds between steady-state passes
    #[arg(long, default_value_t = 30)]
    pub resync_secs: u64,

    /// Upper bound in seconds on error backoff
    #[arg(long, default_value_t = 1000)]
    pub max_backoff_secs: u64,
}

impl RunArgs {
    /// Controller settings for these arguments.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: self.namespace.clone(),
            backoff: Backoff {
                max: Duration::from_secs(self.max_backoff_secs),
                ..Backoff::default()
            },
            reconciler: ReconcilerConfig {
                pod_requeue: Duration::from_secs(self.pod_requeue_secs),
                steady_state_requeue: Duration::from_secs(self.resync_secs),
                ..ReconcilerConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["vscode-operator"]).unwrap();
        let Commands::Run(args) = cli.command() else {
            panic!("expected run");
        };
        assert_eq!(args.probe_addr.port(), 8081);
        assert!(args.namespace.is_none());
    }

    #[test]
    fn test_run_flags_map_to_controller_config() {
        let cli = Cli::try_parse_from([
            "vscode-operator",
            "run",
            "--namespace",
            "tools",
            "--pod-requeue-secs",
            "5",
            "--resync-secs",
            "60",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command() else {
            panic!("expected run");
        };

        let config = args.controller_config();
        assert_eq!(config.namespace.as_deref(), Some("tools"));
        assert_eq!(config.reconciler.pod_requeue, Duration::from_secs(5));
        assert_eq!(
            config.reconciler.steady_state_requeue,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_run_flags_without_subcommand() {
        let cli = Cli::try_parse_from(["vscode-operator", "--namespace", "tools"]).unwrap();
        let Commands::Run(args) = cli.command() else {
            panic!("expected run");
        };
        assert_eq!(args.namespace.as_deref(), Some("tools"));
    }

    #[test]
    fn test_crd_subcommand() {
        let cli = Cli::try_parse_from(["vscode-operator", "crd"]).unwrap();
        assert!(matches!(cli.command(), Commands::Crd));
    }
}
