//! Shared scripted backend for the integration suite.
//!
//! `MockService` stands in for the remote data service. Tests queue explicit
//! steps (rows, affected counts, failures); when the script runs dry the
//! service echoes the statement's table back as a single row, which makes
//! ordering assertions easy.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{DataError, ExecutionResult, ResultSet, Statement};
use strata_executor::ExecutorBuilder;
use strata_pool::{Connection, Connector};
use strata_retry::{FixedDelay, RetryConfig};

/// One scripted response, consumed in FIFO order across all connections.
pub enum Step {
    Rows(Vec<Value>),
    Affected(u64),
    Fail(DataError),
}

pub struct MockService {
    script: Mutex<VecDeque<Step>>,
    latency: Mutex<Duration>,
    pub connects: AtomicUsize,
    pub executes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    live_connections: Mutex<HashSet<usize>>,
    /// Times a connection saw a second execute while one was still running.
    pub double_leases: AtomicUsize,
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            connects: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            live_connections: Mutex::new(HashSet::new()),
            double_leases: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn fail_times(&self, n: usize, make: impl Fn() -> DataError) {
        for _ in 0..n {
            self.push(Step::Fail(make()));
        }
    }

    /// Adds artificial latency to every execute, for concurrency tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }
}

pub struct MockConnector {
    pub service: Arc<MockService>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _preferred_region: Option<&str>,
    ) -> Result<Box<dyn Connection>, DataError> {
        let id = self.service.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            id,
            service: Arc::clone(&self.service),
        }))
    }
}

struct MockConnection {
    id: usize,
    service: Arc<MockService>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<ExecutionResult, DataError> {
        let service = &self.service;
        service.executes.fetch_add(1, Ordering::SeqCst);
        let concurrent = service.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        service.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        if !service.live_connections.lock().unwrap().insert(self.id) {
            service.double_leases.fetch_add(1, Ordering::SeqCst);
        }

        let latency = *service.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let step = service.script.lock().unwrap().pop_front();
        service.live_connections.lock().unwrap().remove(&self.id);
        service.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            None => Ok(ExecutionResult::Rows(ResultSet::new(vec![
                json!({"table": statement.table()}),
            ]))),
            Some(Step::Rows(rows)) => Ok(ExecutionResult::Rows(ResultSet::new(rows))),
            Some(Step::Affected(n)) => Ok(ExecutionResult::Affected(n)),
            Some(Step::Fail(error)) => Err(error),
        }
    }

    async fn ping(&mut self) -> Result<(), DataError> {
        Ok(())
    }
}

/// An [`ExecutorBuilder`] pre-wired to the mock service with fast timeouts.
/// Tests override individual components as needed.
pub fn builder_for(service: &Arc<MockService>) -> ExecutorBuilder {
    init_tracing();
    ExecutorBuilder::new(Arc::new(MockConnector {
        service: Arc::clone(service),
    }))
    .pool(
        strata_pool::PoolConfig::builder()
            .min_connections(1)
            .max_connections(2)
            .acquire_timeout(Duration::from_millis(100))
            .name("integration")
            .build(),
    )
    .retry(
        RetryConfig::builder()
            .max_retries(2)
            .backoff(FixedDelay(Duration::from_millis(1)))
            .build(),
    )
    .call_timeout(Duration::from_millis(500))
    .overall_timeout(Duration::from_secs(5))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
