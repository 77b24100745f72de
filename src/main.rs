//! # VS Code operator
//!
//! Entry point for the controller that turns `VsCode` resources into running
//! editor workloads.
//!
//! ## Initialization Sequence
//!
//! 1. **Tracing** - `RUST_LOG` filter, `info` by default
//! 2. **Kubernetes client** - in-cluster config or local kubeconfig
//! 3. **Probe server** - `/healthz` and `/readyz` for the kubelet
//! 4. **Controller** - runs until SIGINT/SIGTERM
//!
//! Runtime configuration (`VS_CODE_IMAGE`, `ROOT_DOMAIN`,
//! `ISTIO_INGRESS_GATEWAY`) is read at the start of every pass, not at
//! startup, so a missing value fails passes instead of the process.

#![forbid(unsafe_code)]

mod cli;
mod probes;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::CustomResourceExt;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vscode_reconciler::{EnvConfigSource, KubeCluster, VsCode, controller};

use crate::cli::{Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command() {
        Commands::Crd => print_crd(),
        Commands::Run(args) => {
            init_tracing();
            run(args).await
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_crd() -> Result<()> {
    let yaml = serde_yaml::to_string(&VsCode::crd()).context("Failed to render CRD")?;
    print!("{yaml}");
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    info!("VS Code operator starting...");

    let cluster = KubeCluster::try_default()
        .await
        .context("Failed to create Kubernetes client. Check kubeconfig or in-cluster service account")?;

    let probe_addr = args.probe_addr;
    tokio::spawn(async move {
        if let Err(err) = probes::serve(probe_addr).await {
            error!(error = %err, "Probe server failed");
        }
    });

    controller::run(
        cluster,
        Arc::new(EnvConfigSource::new()),
        args.controller_config(),
    )
    .await;

    info!("VS Code operator stopped gracefully");
    Ok(())
}
