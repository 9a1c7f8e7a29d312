use crate::api::{client::*, server::*};
use crate::*;
use razor_cluster::client::Reference;
use razor_cluster::notify::ChangeEvent;
use razor_cluster::registry::Registry;
use razor_cluster::{BackoffConfig, ClientConfig, keys};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[logfn]
#[rstest]
fn test_discover_round_robin(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8001, 8002, 8003]).await;
        let client = h.client(h.reference().param(keys::LOADBALANCE, "roundrobin"), 3).await;
        assert_eq!(client.add(2, 3).await, Ok(5));

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(client.whoami().await.expect("whoami"));
        }
        info!("round robin order {:?}", seen);
        assert_eq!(seen[..3], seen[3..]);
        let mut counts: HashMap<u16, usize> = HashMap::new();
        for port in &seen {
            *counts.entry(*port).or_default() += 1;
        }
        for p in &providers {
            assert_eq!(counts.get(&p.port), Some(&2), "{} not served twice", p.port);
        }
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_provider_churn(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let mut providers = h.providers(&[8011, 8012]).await;
        let client = h.client(h.reference(), 2).await;
        let pool = client.proxy().pool().clone();

        let gone = providers.remove(0);
        gone.server.shutdown().await;
        assert!(!h.local.is_exported(&gone.address()));
        assert!(wait_until(|| pool.len() == 1, Duration::from_secs(2)).await);
        for _ in 0..5 {
            assert_eq!(client.whoami().await, Ok(8012));
        }

        providers.push(h.provider(8013).await);
        assert!(pool.wait_active(2, Duration::from_secs(3)).await);
        let mut served = Vec::new();
        for _ in 0..50 {
            served.push(client.whoami().await.expect("whoami"));
            if served.contains(&8013) {
                break;
            }
        }
        assert!(served.contains(&8013), "new provider never picked");
        assert!(!served.contains(&gone.port));
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_provider_restart(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = h.provider(8016).await;
        let client = h.client(h.reference(), 1).await;
        let pool = client.proxy().pool().clone();
        assert_eq!(client.whoami().await, Ok(8016));

        // crash: stop serving without telling the registry
        drop(provider);
        assert!(wait_until(|| pool.active().is_empty(), Duration::from_secs(2)).await);
        assert_eq!(pool.len(), 1);
        assert!(client.whoami().await.is_err());

        // same address again, the registry sees nothing new
        let provider = h.provider(8016).await;
        assert!(pool.wait_active(1, Duration::from_secs(3)).await);
        assert_eq!(client.whoami().await, Ok(8016));
        assert_eq!(provider.calls(), 1);
        client.proxy().close().await;
        provider.server.shutdown().await;
    });
}

#[logfn]
#[rstest]
fn test_drain_stops_routing(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let providers = h.providers(&[8021, 8022]).await;
        let client = h.client(h.reference(), 2).await;
        let pool = client.proxy().pool().clone();

        providers[0].server.drain().await.expect("drain");
        assert!(wait_until(|| pool.active().len() == 1, Duration::from_secs(2)).await);
        // still listed, only deactivated
        assert_eq!(pool.len(), 2);
        let before = providers[0].calls();
        for _ in 0..10 {
            assert_eq!(client.whoami().await, Ok(8022));
        }
        assert_eq!(providers[0].calls(), before);
        client.proxy().close().await;
        for p in providers {
            p.server.shutdown().await;
        }
    });
}

#[logfn]
#[rstest]
fn test_direct_reference(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = start_provider(&h.ext, None, 8031, None).await.expect("provider");
        // nothing published anywhere
        let discovered = h.registry().discover(&provider.url).await.expect("discover");
        assert!(discovered.is_empty());

        let reference = Reference::new(h.ext.clone(), CalcClient::INTERFACE)
            .version("1.0")
            .config(Harness::config())
            .direct(vec![provider.url.clone()]);
        let client = h.client(reference, 1).await;
        assert_eq!(client.add(40, 2).await, Ok(42));
        assert_eq!(client.whoami().await, Ok(8031));
        client.proxy().close().await;
        provider.server.shutdown().await;
    });
}

#[logfn]
#[rstest]
fn test_pool_listener(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let first = h.provider(8041).await;
        let client = h.client(h.reference(), 1).await;
        let pool = client.proxy().pool().clone();

        let largest = Arc::new(AtomicUsize::new(0));
        let l = largest.clone();
        pool.add_listener(Arc::new(move |event: &ChangeEvent| {
            debug!("pool changed: {:?}", event.providers);
            l.fetch_max(event.active().count(), Ordering::SeqCst);
        }));
        let second = h.provider(8042).await;
        assert!(wait_until(|| largest.load(Ordering::SeqCst) == 2, Duration::from_secs(2)).await);
        client.proxy().close().await;
        first.server.shutdown().await;
        second.server.shutdown().await;
    });
}

#[logfn]
#[rstest]
fn test_subscribe_retry(runner: TestRunner) {
    runner.block_on(async move {
        let h = Harness::new();
        let provider = h.provider(8051).await;
        let registry = h.registry();
        registry.set_reachable(false);

        let retry = BackoffConfig {
            max_attempts: 20,
            initial: Duration::from_millis(20),
            max: Duration::from_millis(50),
            jitter: 0.0,
            ..Default::default()
        };
        let config = ClientConfig { registry_retry: retry, ..Harness::config() };
        let r = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            r.set_reachable(true);
        });
        let client = h.client(h.reference().config(config), 1).await;
        assert_eq!(client.whoami().await, Ok(8051));
        client.proxy().close().await;

        registry.set_reachable(false);
        let config = ClientConfig { registry_retry: BackoffConfig::once(), ..Harness::config() };
        match h.reference().config(config).build().await {
            Err(e) => assert!(
                matches!(e.int_err(), Some(razor_cluster::error::RpcIntErr::RegistryConnection(_))),
                "{}",
                e
            ),
            Ok(_) => panic!("subscribe to an unreachable registry succeeded"),
        }
        registry.set_reachable(true);
        provider.server.shutdown().await;
    });
}
