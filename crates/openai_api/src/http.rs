use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::Response;
use turn_provider::CancelSignal;

use crate::error::{parse_error_message, ApiError};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub(crate) fn is_cancelled(cancel: Option<&CancelSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

/// Await a future while polling the cancellation signal.
///
/// No suspension point may block indefinitely; the timeout window keeps the
/// cancellation check responsive without busy-spinning.
pub(crate) async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancelSignal>,
) -> Result<F::Output, ApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

/// Send a built request and map non-2xx statuses to a fatal turn error.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
    cancellation: Option<&CancelSignal>,
) -> Result<Response, ApiError> {
    let response = await_or_cancel(request.send(), cancellation)
        .await?
        .map_err(ApiError::from)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = await_or_cancel(response.text(), cancellation)
        .await?
        .unwrap_or_default();
    Err(ApiError::Status(status, parse_error_message(status, &body)))
}
