//! Task scaffolding shared by the comms channels.
//!
//! Each channel is a [`Component`]: it owns whatever it needs
//! (`Arc<CommsState>`, bind address, reader/writer) and turns into a single
//! future when run. [`spawn_components`] runs them side by side and returns a
//! [`SubsystemHandle`]. The first channel to fail cancels the shared token,
//! so the others wind down and the process exits with that error.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Name used in log fields.
    fn id(&self) -> &str;

    /// Turn the component into its run loop. The loop must return once
    /// `shutdown` is cancelled.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Resolves once every spawned component has returned.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Comms(format!("comms manager task panicked: {e}"))))
    }
}

pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> SubsystemHandle {
    let inner = tokio::spawn(async move {
        let mut set = JoinSet::new();
        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "spawning component");
            let fut = component.run(shutdown.clone());
            set.spawn(async move { (id, fut.await) });
        }

        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(()))) => info!(component = %id, "component finished"),
                Ok((id, Err(e))) => {
                    error!(component = %id, error = %e, "component failed");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "component panicked");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("component panicked: {e}")));
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    });

    SubsystemHandle { inner }
}
