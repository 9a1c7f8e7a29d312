use crate::api::{client::*, server::*};
use crate::*;
use razor_cluster::error::{RemoteError, RpcError, RpcIntErr};
use razor_cluster::{ClientConfig, keys};
use std::time::Duration;

fn config(cluster: &str, timeout_ms: u64) -> ClientConfig {
    ClientConfig {
        cluster: cluster.to_string(),
        loadbalance: "roundrobin".to_string(),
        timeout: Duration::from_millis(timeout_ms),
        ..Harness::config()
    }
}

fn total_calls(providers: &[Provider]) -> usize {
    providers.iter().map(|p| p.calls()).sum()
}

#[logfn]
#[rstest]
fn test_failover_broken_link(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8101, 8102]).await;
        let client = h.client(h.reference().config(config("failover", 1000)), 2).await;
        let pool = client.proxy().pool().clone();

        assert!(h.local.suspend(&providers[0].address()));
        for _ in 0..10 {
            assert_eq!(client.whoami().await, Ok(8102));
        }
        assert_eq!(providers[0].calls(), 0);
        assert!(pool.active().len() < 2);

        assert!(h.local.resume(&providers[0].address()));
        // the heartbeat brings it back
        assert!(pool.wait_active(2, Duration::from_secs(3)).await);
        let mut served = Vec::new();
        for _ in 0..4 {
            served.push(client.whoami().await.expect("whoami"));
        }
        assert!(served.contains(&8101) && served.contains(&8102), "{:?}", served);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_failover_exhausted(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8111, 8112]).await;
        // no heartbeat, the broken links are only found by the calls
        let config =
            ClientConfig { health_check_interval: Duration::ZERO, ..config("failover", 1000) };
        let client = h.client(h.reference().config(config), 2).await;
        for p in &providers {
            h.local.suspend(&p.address());
        }
        match client.whoami().await {
            Err(RpcError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, RpcError::Rpc(RpcIntErr::Transport(_))), "{}", last);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(total_calls(&providers), 0);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_user_error_not_retried(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8121, 8122, 8123]).await;
        let client = h.client(h.reference().config(config("failover", 1000)), 3).await;

        let res = client.fail("out of paper".to_string()).await;
        assert_eq!(res, Err(RpcError::User(RemoteError::new("TestError", "out of paper"))));
        assert!(!res.unwrap_err().is_retryable());
        assert_eq!(total_calls(&providers), 1);

        // unknown methods are framework errors, and final as well
        let res: Result<i64, RpcError> = client.proxy().call("mul", &(2i64, 3i64)).await;
        assert!(matches!(res, Err(RpcError::Rpc(RpcIntErr::Method(_)))), "{:?}", res);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_failfast_timeout(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8131, 8132]).await;
        let client = h.client(h.reference().config(config("failfast", 200)), 2).await;

        let res = client.sleep(600).await;
        assert_eq!(res, Err(RpcError::Rpc(RpcIntErr::Timeout)));
        assert_eq!(total_calls(&providers), 1);
        // the late answer is dropped and the channel keeps working
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.add(1, 1).await, Ok(2));
        assert_eq!(client.proxy().pool().active().len(), 2);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_failover_timeout(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8141, 8142]).await;
        let client = h.client(h.reference().config(config("failover", 200)), 2).await;

        // the deadline is shared by every attempt, there is no time left for a second one
        match client.sleep(600).await {
            Err(e @ RpcError::RetryExhausted { .. }) => {
                assert_eq!(e.int_err(), Some(&RpcIntErr::Timeout))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(total_calls(&providers), 1);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_failsafe(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = h.provider(8151).await;
        let client = h.client(h.reference().param(keys::CLUSTER, "failsafe"), 1).await;

        assert_eq!(client.fail("ignored".to_string()).await, Ok(()));
        let res: Option<i64> = client.proxy().call("add", &(20i64, 22i64)).await.expect("add");
        assert_eq!(res, Some(42));

        provider.server.shutdown().await;
        let pool = client.proxy().pool().clone();
        assert!(wait_until(|| pool.is_empty(), Duration::from_secs(2)).await);
        let res: Option<u16> = client.proxy().call("whoami", &()).await.expect("whoami");
        assert_eq!(res, None);
        client.proxy().close().await;
    });
}

#[logfn]
#[rstest]
fn test_failsafe_typed_default(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = h.provider(8156).await;
        let client = h.client(h.reference().param(keys::CLUSTER, "failsafe"), 1).await;
        assert_eq!(client.whoami().await, Ok(8156));

        h.local.suspend(&provider.address());
        assert_eq!(client.whoami().await, Ok(0));
        assert_eq!(client.add(1, 2).await, Ok(0));
        let fut = client.proxy().call_async::<_, u16>("sleep", &(1u64,));
        assert_eq!(fut.wait().await, Ok(0));
        assert_eq!(provider.calls(), 1);

        h.local.resume(&provider.address());
        let pool = client.proxy().pool().clone();
        assert!(pool.wait_active(1, Duration::from_secs(3)).await);
        assert_eq!(client.add(1, 2).await, Ok(3));
        client.proxy().close().await;
        provider.server.shutdown().await;
    });
}

#[logfn]
#[rstest]
fn test_broadcast(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8161, 8162, 8163]).await;
        let client = h.client(h.reference().param(keys::CLUSTER, "broadcast"), 3).await;
        let pool = client.proxy().pool().clone();

        let first = pool.senders()[0].url().port();
        assert_eq!(client.whoami().await, Ok(first));
        for p in &providers {
            assert_eq!(p.calls(), 1);
        }

        match client.fail("everyone".to_string()).await {
            Err(RpcError::BroadcastFailed(errors)) => {
                assert_eq!(errors.len(), 3);
                for e in errors {
                    assert_eq!(e, RpcError::User(RemoteError::new("TestError", "everyone")));
                }
            }
            other => panic!("unexpected {:?}", other),
        }

        // one broken link is not enough to fail
        h.local.suspend(&providers[2].address());
        assert!(client.whoami().await.is_ok());
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}
