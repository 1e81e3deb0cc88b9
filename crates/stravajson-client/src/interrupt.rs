//! Process-wide Ctrl-C handling.

use std::future::Future;
use std::io;

use stravajson_api::ApiError;
use tracing::warn;

use crate::error::ClientResult;

/// Runs `work` until it finishes or `interrupt` fires.
///
/// When the interrupt wins, `work` is dropped, which stops any running
/// authorization listener. If the interrupt source fails to install, `work`
/// simply runs to completion.
pub async fn run_interruptible<T, W, I>(work: W, interrupt: I) -> ClientResult<T>
where
    W: Future<Output = ClientResult<T>>,
    I: Future<Output = io::Result<()>>,
{
    let interrupt = async {
        if let Err(e) = interrupt.await {
            warn!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = work => result,
        () = interrupt => Err(ApiError::Interrupted.into()),
    }
}
