use crate::api::{client::*, server::*};
use crate::*;
use razor_cluster::ClientConfig;
use razor_cluster::error::{RemoteError, RpcError, RpcIntErr};
use std::time::Duration;
use tokio::sync::oneshot;

#[logfn]
#[rstest]
fn test_call_async_callback(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = h.provider(8201).await;
        let client = h.client(h.reference(), 1).await;

        let fut = client.proxy().call_async::<_, u16>("sleep", &(50u64,));
        assert!(!fut.is_done());
        let (tx, rx) = oneshot::channel();
        fut.on_complete(move |res| {
            let _ = tx.send(res);
        });
        assert_eq!(rx.await.expect("callback"), Ok(8201));
        assert!(fut.is_done());
        // registered after completion, fires at once with the same result
        let (tx, rx) = oneshot::channel();
        fut.on_complete(move |res| {
            let _ = tx.send(res);
        });
        assert_eq!(rx.await.expect("late callback"), Ok(8201));
        assert_eq!(fut.wait().await, Ok(8201));

        let fut = client.proxy().call_async::<_, ()>("fail", &("late".to_string(),));
        let (tx, rx) = oneshot::channel();
        fut.inner().on_failure(move |e| {
            let _ = tx.send(e.clone());
        });
        assert_eq!(rx.await.expect("failure"), RpcError::User(RemoteError::new("TestError", "late")));
        client.proxy().close().await;
        provider.server.shutdown().await;
    });
}

#[logfn]
#[rstest]
fn test_call_async_concurrent(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8211, 8212]).await;
        let config = ClientConfig { timeout: Duration::from_millis(500), ..Harness::config() };
        let client = h.client(h.reference().config(config), 2).await;

        let futs: Vec<_> =
            (0..32i64).map(|i| client.proxy().call_async::<_, i64>("add", &(i, i))).collect();
        for (i, fut) in futs.into_iter().enumerate() {
            assert_eq!(fut.wait().await, Ok(2 * i as i64));
        }
        assert_eq!(providers.iter().map(|p| p.calls()).sum::<usize>(), 32);

        // slower than the deadline
        let fut = client.proxy().call_async::<_, u16>("sleep", &(2000u64,));
        let started = std::time::Instant::now();
        let res = fut.wait().await;
        assert_eq!(res.as_ref().err().and_then(|e| e.int_err()), Some(&RpcIntErr::Timeout), "{:?}", res);
        assert!(started.elapsed() < Duration::from_millis(1900));
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}
