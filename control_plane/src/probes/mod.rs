mod liveness_check;

use self::liveness_check::liveness_check;
use crate::health::KubernetesApiHealthIndicator;
use crate::kubernetes::Cluster;
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum_health::Health;
use getset::{CloneGetters, CopyGetters, Getters};
use ko_core::task::Builder as TaskBuilder;
use problemdetails::Problem;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use typed_builder::TypedBuilder;

#[derive(TypedBuilder, Getters, CloneGetters, CopyGetters)]
pub struct SpawnProbesParameters {
    #[getset(get_copy = "")]
    port: u16,

    #[getset(get_clone = "")]
    cluster: Arc<dyn Cluster>,

    #[getset(get = "")]
    #[builder(default, setter(into))]
    watch_namespace: Option<String>,
}

impl SpawnProbesParameters {
    fn endpoint(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port()))
    }
}

#[derive(Debug, Error)]
pub enum SpawnProbesError {
    #[error("Failed to bind health probe endpoint: {0}")]
    NetworkBind(#[from] std::io::Error),
}

pub async fn spawn_probes(
    task_builder: &TaskBuilder,
    params: SpawnProbesParameters,
) -> Result<(), SpawnProbesError> {
    let kube_health = KubernetesApiHealthIndicator::new(
        params.cluster(),
        params.watch_namespace().clone(),
    );
    let health = Health::builder().with_indicator(kube_health).build();

    let endpoint = params.endpoint();
    let tcp_listener = TcpListener::bind(endpoint).await?;
    info!("Serving health probes on {}", endpoint);

    let shutdown = task_builder.shutdown_signal();
    task_builder
        .new_task("health_probes")
        .spawn_fallible(async move {
            axum::serve(tcp_listener, router(health))
                .with_graceful_shutdown(shutdown)
                .await
        });

    Ok(())
}

fn router(health: Health) -> Router {
    Router::new()
        .route("/healthz/liveness", get(liveness_check))
        .route("/healthz/readiness", get(axum_health::health))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(health)
}

async fn not_found() -> impl IntoResponse {
    Problem::from(StatusCode::NOT_FOUND)
        .with_value("status", StatusCode::NOT_FOUND.as_u16())
        .with_title("Not Found")
        .with_detail("The requested resource could not be found")
}

async fn method_not_allowed() -> impl IntoResponse {
    Problem::from(StatusCode::METHOD_NOT_ALLOWED)
        .with_value("status", StatusCode::METHOD_NOT_ALLOWED.as_u16())
        .with_title("Method Not Allowed")
        .with_detail("The requested method is not allowed for this resource")
}
