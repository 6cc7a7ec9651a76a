//! Shared mocks and fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use loadbalancer_manager::dataplane::{DataPlaneApi, DataPlaneError};
use loadbalancer_manager::inventory::{InventoryError, LoadBalancer, LoadBalancerApi, Origin, Pool, Port};

pub const MANAGED_LB_ID: &str = "loadbal-test";

pub fn base_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/haproxy.cfg")
}

pub fn expected_config(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name);
    std::fs::read_to_string(path).unwrap()
}

/// The load balancer behind `testdata/lb-ex-1-exp.cfg`.
pub fn example_load_balancer() -> LoadBalancer {
    let origin = |id: &str, target: &str, port: u16, active: bool| Origin {
        id: id.to_string(),
        name: id.to_string(),
        target: target.to_string(),
        port_number: port,
        active,
    };

    LoadBalancer {
        id: MANAGED_LB_ID.to_string(),
        name: "test".to_string(),
        ports: vec![Port {
            id: "loadprt-test".to_string(),
            name: "ssh-service".to_string(),
            address_family: "ipv4".to_string(),
            number: 22,
            pools: vec![Pool {
                id: "loadpol-test".to_string(),
                name: "ssh-service-a".to_string(),
                protocol: "tcp".to_string(),
                origins: vec![
                    origin("loadogn-test1", "1.2.3.4", 2222, true),
                    origin("loadogn-test2", "1.2.3.4", 222, true),
                    origin("loadogn-test3", "4.3.2.1", 2222, false),
                ],
            }],
        }],
    }
}

type Respond<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Data plane whose answers come from closures; counts every call.
pub struct MockDataPlane {
    ready: Respond<bool>,
    check: Respond<Result<(), DataPlaneError>>,
    post: Respond<Result<(), DataPlaneError>>,
    pub ready_calls: AtomicUsize,
    pub check_calls: AtomicUsize,
    pub post_calls: AtomicUsize,
    pub posted: Mutex<Vec<String>>,
}

impl MockDataPlane {
    /// Ready, and accepts every document.
    pub fn healthy() -> Self {
        Self {
            ready: Box::new(|| true),
            check: Box::new(|| Ok(())),
            post: Box::new(|| Ok(())),
            ready_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ready(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.ready = Box::new(f);
        self
    }

    pub fn with_check(mut self, f: impl Fn() -> Result<(), DataPlaneError> + Send + Sync + 'static) -> Self {
        self.check = Box::new(f);
        self
    }

    pub fn with_post(mut self, f: impl Fn() -> Result<(), DataPlaneError> + Send + Sync + 'static) -> Self {
        self.post = Box::new(f);
        self
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.ready_calls.load(Ordering::SeqCst),
            self.check_calls.load(Ordering::SeqCst),
            self.post_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl DataPlaneApi for MockDataPlane {
    async fn api_is_ready(&self) -> bool {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        (self.ready)()
    }

    async fn check_config(&self, _config: &str) -> Result<(), DataPlaneError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        (self.check)()
    }

    async fn post_config(&self, config: &str) -> Result<(), DataPlaneError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.post)();
        if result.is_ok() {
            self.posted.lock().unwrap().push(config.to_string());
        }
        result
    }
}

/// Inventory whose answer comes from a closure; counts every call.
pub struct MockInventory {
    respond: Respond<Result<LoadBalancer, InventoryError>>,
    pub calls: AtomicUsize,
}

impl MockInventory {
    pub fn new(f: impl Fn() -> Result<LoadBalancer, InventoryError> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(f),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(lb: LoadBalancer) -> Self {
        Self::new(move || Ok(lb.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoadBalancerApi for MockInventory {
    async fn get_load_balancer(&self, _id: &str) -> Result<LoadBalancer, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)()
    }
}
