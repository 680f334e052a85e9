#![warn(
    clippy::pedantic,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::needless_pass_by_value,
    clippy::needless_continue,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::struct_field_names
)]

mod cli;
mod controllers;
mod health;
pub mod kubernetes;
mod options;
mod probes;

use crate::controllers::{SpawnControllersParams, spawn_controllers};
use crate::kubernetes::{ClusterError, KubeCluster, start_kubernetes_client};
use crate::options::Options;
use crate::probes::{SpawnProbesError, SpawnProbesParameters, spawn_probes};
use clap::Parser;
use cli::Cli;
use ko_core::instrumentation::init_instrumentation;
use ko_core::task::{Builder as TaskBuilder, TaskError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum MainError {
    #[error("Failed to set up tasks: {0}")]
    Task(#[from] TaskError),
    #[error("Failed to start Kubernetes client: {0}")]
    KubernetesClient(#[from] ClusterError),
    #[error("Failed to spawn health probes: {0}")]
    SpawnProbes(#[from] SpawnProbesError),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), MainError> {
    let args = Cli::parse();
    let options = Arc::new(Options::default());

    init_instrumentation(args.log_format());
    info!(
        "Starting control plane; service_converter={} watch_namespace={:?}",
        args.service_converter(),
        args.watch_namespace()
    );

    let task_builder = TaskBuilder::new()?;

    let client = start_kubernetes_client()
        .await
        .inspect_err(|err| error!("Failed to start Kubernetes client: {}", err))?;

    {
        let params = SpawnProbesParameters::builder()
            .port(args.health_port())
            .cluster(Arc::new(KubeCluster::new(client.clone())))
            .watch_namespace(args.watch_namespace().clone())
            .build();

        spawn_probes(&task_builder, params)
            .await
            .inspect_err(|err| error!("Failed to spawn health probes: {}", err))?;
    }

    {
        let params = SpawnControllersParams::builder()
            .options(options)
            .client(client)
            .watch_namespace(args.watch_namespace().clone())
            .service_converter(args.service_converter())
            .build();

        spawn_controllers(&task_builder, params);
    }

    task_builder.join_all().await;
    info!("Control plane stopped");

    Ok(())
}
