pub mod api;
pub mod cluster;

extern crate captains_log;
extern crate log;
pub use captains_log::logfn;
use captains_log::*;
use rstest::*;
use std::fmt;
use std::future::Future;
use tokio::runtime::Runtime;

pub fn new_rt() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(4),
        )
        .enable_all()
        .build()
        .expect("runtime")
}

#[fixture]
pub fn runner() -> TestRunner {
    TestRunner::new()
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "")
    }
}

pub struct TestRunner {
    pub rt: Runtime,
}

impl TestRunner {
    pub fn new() -> Self {
        recipe::raw_file_logger("/tmp/razor_cluster_test.log", Level::Trace)
            .test()
            .build()
            .expect("log");
        Self { rt: crate::new_rt() }
    }

    pub fn block_on<F: Future<Output = ()>>(&self, f: F) {
        self.rt.block_on(f);
    }
}
