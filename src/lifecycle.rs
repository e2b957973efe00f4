use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::manager::BackendManager;
use crate::capsule;
use crate::error::Result;
use crate::frontend::manager::FrontendManager;

/// Join both managers with a link of `capacity` and run them until
/// `shutdown` resolves or either manager exits.
///
/// Cancellation only reaches the front-end manager. It closes its half of the
/// link once accepted messages are forwarded, and the back-end ends after
/// answering everything on the link. Both are awaited, so every provider is
/// stopped and every in-flight capsule delivered before this returns.
pub async fn run<F>(
    frontend: FrontendManager,
    backend: BackendManager,
    capacity: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let cancel = CancellationToken::new();
    let (front_link, back_link) = capsule::link(capacity);

    let front_guard = cancel.clone().drop_guard();
    let front_cancel = cancel.clone();
    let front = tokio::spawn(async move {
        let _guard = front_guard;
        frontend.start(front_link, front_cancel).await;
    });

    let back_guard = cancel.clone().drop_guard();
    let back = tokio::spawn(async move {
        let _guard = back_guard;
        backend.start(back_link).await;
    });

    tokio::select! {
        _ = shutdown => info!("shutdown requested"),
        _ = cancel.cancelled() => warn!("a manager exited on its own, shutting down"),
    }
    cancel.cancel();

    let (front, back) = tokio::join!(front, back);
    front?;
    back?;
    info!("all providers stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
