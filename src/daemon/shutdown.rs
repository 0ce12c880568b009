use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process. The daemon can also be stopped
/// through the control socket, which cancels the same token, so this
/// completes on either path.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
