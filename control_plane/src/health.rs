use crate::kubernetes::Cluster;
use async_trait::async_trait;
use axum_health::{HealthDetail, HealthIndicator};
use ko_api::configuration::KongService;
use kube::api::ApiResource;
use std::sync::Arc;

/// Ready once the API server answers a list of the objects the controllers
/// manage, in the namespace they watch.
pub struct KubernetesApiHealthIndicator {
    cluster: Arc<dyn Cluster>,
    namespace: Option<String>,
}

impl KubernetesApiHealthIndicator {
    pub fn new(cluster: Arc<dyn Cluster>, namespace: Option<String>) -> Self {
        Self { cluster, namespace }
    }
}

#[async_trait]
impl HealthIndicator for KubernetesApiHealthIndicator {
    fn name(&self) -> String {
        "KubernetesAPI".to_string()
    }

    async fn details(&self) -> HealthDetail {
        let resource = ApiResource::erase::<KongService>(&());
        match self
            .cluster
            .list(&resource, self.namespace.as_deref(), None)
            .await
        {
            Ok(_) => HealthDetail::up(),
            Err(e) => {
                let mut health = HealthDetail::down();
                health.with_detail("error".to_string(), e.to_string());
                health
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing::FakeCluster;
    use axum_health::HealthStatus;
    use rstest::rstest;

    #[rstest]
    #[case::watched_namespace(Some("apps"))]
    #[case::every_namespace(None)]
    #[test_log::test(tokio::test)]
    async fn test_lists_in_watched_scope(#[case] namespace: Option<&str>) {
        let cluster = Arc::new(FakeCluster::default());
        let indicator =
            KubernetesApiHealthIndicator::new(cluster.clone(), namespace.map(ToString::to_string));

        let health = indicator.details().await;

        assert_eq!(health.status, HealthStatus::Up);
        assert_eq!(
            cluster.lists(),
            vec![("KongService".to_string(), namespace.map(ToString::to_string))]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_down_when_list_fails() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.fail_list_of("KongService");
        let indicator = KubernetesApiHealthIndicator::new(cluster, Some("apps".to_string()));

        let health = indicator.details().await;

        assert_eq!(health.status, HealthStatus::Down);
        assert!(health.details.contains_key("error"));
    }
}
