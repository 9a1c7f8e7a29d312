use crate::config::BackoffConfig;
use crate::error::{RpcError, RpcIntErr};
use std::future::Future;

/// Run `op` until it succeeds, retrying registry connection failures with
/// exponential backoff. Other errors are returned at once.
pub async fn retry_registry<T, F, Fut>(
    config: &BackoffConfig, what: &str, mut op: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(r) => return Ok(r),
            Err(RpcError::Rpc(RpcIntErr::RegistryConnection(reason)))
                if attempt < config.max_attempts =>
            {
                let delay = config.delay(attempt);
                warn!(
                    "{}: registry unreachable ({}), retry #{} in {:?}",
                    what, reason, attempt, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast() -> BackoffConfig {
        BackoffConfig {
            max_attempts: 3,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_retry_until_reachable() {
        let calls = &AtomicU32::new(0);
        let res = retry_registry(&fast(), "register", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RpcError::Rpc(RpcIntErr::RegistryConnection("refused".into())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(res, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = &AtomicU32::new(0);
        let res: Result<(), _> = retry_registry(&fast(), "register", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Rpc(RpcIntErr::RegistryConnection("refused".into())))
        })
        .await;
        assert!(matches!(res, Err(RpcError::Rpc(RpcIntErr::RegistryConnection(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let calls = &AtomicU32::new(0);
        let res: Result<(), _> = retry_registry(&fast(), "register", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Rpc(RpcIntErr::Timeout))
        })
        .await;
        assert!(res.unwrap_err().is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
