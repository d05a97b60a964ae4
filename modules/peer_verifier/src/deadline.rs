use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::verify_error::PeerVerifyError;

/// Time left before `deadline`, or an error if it has passed
pub(crate) fn remaining(deadline: Instant) -> Result<Duration, PeerVerifyError> {
    match deadline.checked_duration_since(Instant::now()) {
        Some(left) if !left.is_zero() => Ok(left),
        _ => Err(PeerVerifyError::DeadlineElapsed),
    }
}

/// Run a peer request bounded by both the per-request cap and the
/// overall deadline. The request future is dropped on expiry.
pub(crate) async fn call_peer<T, F>(
    deadline: Instant,
    cap: Duration,
    request: F,
) -> Result<T, PeerVerifyError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let budget = remaining(deadline)?.min(cap);
    match tokio::time::timeout(budget, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PeerVerifyError::PeerRequest(e)),
        Err(_) if remaining(deadline).is_err() => Err(PeerVerifyError::DeadlineElapsed),
        Err(_) => Err(PeerVerifyError::PeerTimeout(budget)),
    }
}

/// Run a local lookup, abandoning it once `deadline` passes
pub(crate) async fn call_local<T, F>(deadline: Instant, lookup: F) -> Result<T, PeerVerifyError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    remaining(deadline)?;
    match tokio::time::timeout_at(deadline, lookup).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PeerVerifyError::LocalChain(e)),
        Err(_) => Err(PeerVerifyError::DeadlineElapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn past_deadline_fails_without_polling() {
        let deadline = Instant::now();
        let result = call_peer(
            deadline,
            Duration::from_secs(1),
            std::future::pending::<anyhow::Result<()>>(),
        )
        .await;
        assert!(matches!(result, Err(PeerVerifyError::DeadlineElapsed)));
    }

    #[tokio::test]
    async fn slow_request_hits_per_call_cap() {
        let deadline = Instant::now() + Duration::from_secs(60);
        let result = call_peer(deadline, Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u64, anyhow::Error>(1)
        })
        .await;
        assert!(matches!(result, Err(PeerVerifyError::PeerTimeout(_))));
    }

    #[tokio::test]
    async fn slow_request_hits_deadline() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = call_peer(deadline, Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u64, anyhow::Error>(1)
        })
        .await;
        assert!(matches!(result, Err(PeerVerifyError::DeadlineElapsed)));
    }

    #[tokio::test]
    async fn slow_local_lookup_hits_deadline() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = call_local(deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<u64, anyhow::Error>(1)
        })
        .await;
        assert!(matches!(result, Err(PeerVerifyError::DeadlineElapsed)));
    }

    #[tokio::test]
    async fn local_failure_is_reported_as_local() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let result =
            call_local(deadline, async { Err::<u64, _>(anyhow::anyhow!("disk gone")) }).await;
        assert!(matches!(result, Err(PeerVerifyError::LocalChain(_))));
    }
}
