//! Helpers around [`CancellationToken`] used by the judging workflow.

use futures::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
pub use tokio_util::sync::CancellationToken;

/// Run `fut` until it completes or `token` gets cancelled.
///
/// Returns `None` if cancelled. Cancellation is checked first, so a future
/// started after cancellation never gets polled.
pub async fn cancellable<F: Future>(fut: F, token: &CancellationToken) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Spawn a task that cancels `token` when `deadline` elapses or when `linked`
/// gets cancelled. The task exits on its own once `token` is cancelled.
///
/// Abort the returned handle when the guarded work is finished.
pub fn spawn_watchdog(
    token: CancellationToken,
    linked: Option<CancellationToken>,
    deadline: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline_elapsed = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => futures::future::pending::<()>().await,
            }
        };
        let linked_cancelled = async {
            match &linked {
                Some(l) => l.cancelled().await,
                None => futures::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = deadline_elapsed => {
                tracing::warn!(?deadline, "Submission deadline reached, cancelling outstanding polls");
                token.cancel();
            }
            _ = linked_cancelled => {
                tracing::info!("Cancelled by caller");
                token.cancel();
            }
        }
    })
}
