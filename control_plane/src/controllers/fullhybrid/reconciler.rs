use crate::controllers::fullhybrid::RootObject;
use crate::controllers::fullhybrid::converter::{ApiConverter, ConverterError};
use crate::controllers::fullhybrid::enforce::{EnforceError, enforce_state};
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::{Cluster, ClusterError, get_object};
use crate::options::Options;
use futures::StreamExt;
use kube::ResourceExt;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use std::future::ready;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Object has no namespace")]
    MissingNamespace,
    #[error("Failed to fetch root object: {0}")]
    Cluster(#[from] ClusterError),
    #[error("Failed to translate root object: {0}")]
    Converter(#[from] ConverterError),
    #[error("Failed to enforce state: {0}")]
    Enforce(#[from] EnforceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The root object is gone or going; its owned objects are left to the
    /// garbage collector.
    Deleted,
    Done,
    Requeue,
}

/// Reconciles root objects of type `T` through converter `C`, building a
/// fresh converter for every pass.
pub struct GatewayApiHybridReconciler<T, C> {
    cluster: Arc<dyn Cluster>,
    options: Arc<Options>,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C> GatewayApiHybridReconciler<T, C>
where
    T: RootObject,
    C: ApiConverter<T> + Default + 'static,
{
    pub fn new(cluster: Arc<dyn Cluster>, options: Arc<Options>) -> Self {
        Self {
            cluster,
            options,
            _marker: PhantomData,
        }
    }

    #[instrument(skip(self), level = "debug", name = "fullhybrid::reconcile")]
    pub async fn reconcile_object(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let cluster = self.cluster.as_ref();
        let Some(root) = get_object::<T>(cluster, Some(namespace), name).await? else {
            debug!("Root object {}/{} not found", namespace, name);
            return Ok(ReconcileOutcome::Deleted);
        };
        if root.meta().deletion_timestamp.is_some() {
            debug!("Root object {}/{} is being deleted", namespace, name);
            return Ok(ReconcileOutcome::Deleted);
        }

        let mut converter = C::default();
        converter.set_root_object(root);
        converter.load_store(cluster).await?;
        converter.translate()?;

        let outcome = enforce_state::<T, C>(cluster, &converter).await?;
        info!(
            "Reconciled object; object.ref={} created={} deleted={}",
            root_ref::<T>(namespace, name),
            outcome.created,
            outcome.deleted
        );

        Ok(if outcome.requeue {
            ReconcileOutcome::Requeue
        } else {
            ReconcileOutcome::Done
        })
    }

    /// Drives `controller` until shutdown.
    pub async fn run(self, controller: Controller<T>) {
        controller
            .shutdown_on_signal()
            .run(reconcile::<T, C>, error_policy::<T, C>, Arc::new(self))
            .for_each(|result| {
                match result {
                    Ok((object_ref, action)) => {
                        debug!("Reconciled {}; action={:?}", object_ref, action);
                    }
                    Err(err) => warn!("Reconcile failed: {}", err),
                }
                ready(())
            })
            .await;
    }
}

fn root_ref<T: RootObject>(namespace: &str, name: &str) -> ObjectRef {
    ObjectRef::of_kind::<T>()
        .namespace(Some(namespace.to_string()))
        .name(name)
        .build()
}

async fn reconcile<T, C>(
    object: Arc<T>,
    ctx: Arc<GatewayApiHybridReconciler<T, C>>,
) -> Result<Action, ReconcileError>
where
    T: RootObject,
    C: ApiConverter<T> + Default + 'static,
{
    let namespace = object.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = object.name_any();

    Ok(match ctx.reconcile_object(&namespace, &name).await? {
        ReconcileOutcome::Deleted | ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::Requeue => Action::requeue(ctx.options.requeue_after_change()),
    })
}

fn error_policy<T, C>(
    object: Arc<T>,
    err: &ReconcileError,
    ctx: Arc<GatewayApiHybridReconciler<T, C>>,
) -> Action
where
    T: RootObject,
    C: ApiConverter<T> + Default + 'static,
{
    warn!(
        "Failed to reconcile {}/{}: {}",
        object.namespace().unwrap_or_default(),
        object.name_any(),
        err
    );
    Action::requeue(ctx.options.controller_error_requeue_duration())
}
