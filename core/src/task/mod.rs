use std::cell::RefCell;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_shutdown::Shutdown;
use tracing::{Instrument, error, info, info_span};

type MutableJoinSet = Rc<RefCell<JoinSet<()>>>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to install shutdown signal handler: {0}")]
    Shutdown(String),
}

pub struct Builder {
    join_set: MutableJoinSet,
    shutdown: Shutdown,
}

impl Builder {
    pub fn new() -> Result<Self, TaskError> {
        let shutdown = Shutdown::new().map_err(|err| TaskError::Shutdown(format!("{err:?}")))?;
        Ok(Self {
            join_set: MutableJoinSet::default(),
            shutdown,
        })
    }

    pub fn new_task(&self, name: &'static str) -> Spawner {
        Spawner {
            name,
            join_set: self.join_set.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// A future that resolves once the process has been asked to stop.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let shutdown = self.shutdown.clone();
        async move { shutdown.handle().await }
    }

    pub async fn join_all(self) {
        let join_set = self.join_set.take();
        let _ = join_set.join_all().await;
    }

    pub fn len(&self) -> usize {
        self.join_set.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.borrow().is_empty()
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("tasks", &self.len())
            .finish_non_exhaustive()
    }
}

pub struct Spawner {
    name: &'static str,
    join_set: MutableJoinSet,
    shutdown: Shutdown,
}

impl Spawner {
    pub fn spawn<F>(self, task: F)
    where
        F: Future<Output = ()>,
        F: Send + 'static,
    {
        let span = info_span!("task", task.name = self.name);
        self.join_set.borrow_mut().spawn(task.instrument(span));
    }

    /// Spawns a task whose failure is logged rather than propagated.
    pub fn spawn_fallible<F, E>(self, task: F)
    where
        F: Future<Output = Result<(), E>>,
        F: Send + 'static,
        E: Display,
    {
        let name = self.name;
        self.spawn(async move {
            match task.await {
                Ok(()) => info!("Task '{}' finished", name),
                Err(err) => error!("Task '{}' failed: {}", name, err),
            }
        });
    }

    pub fn spawn_on_shutdown<F>(self, task: F)
    where
        F: Future<Output = ()>,
        F: Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.spawn(async move {
            let () = shutdown.handle().await;
            task.await;
        });
    }
}
