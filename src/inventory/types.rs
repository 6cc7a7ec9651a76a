//! Desired-state graph for a load balancer.
//!
//! Values are built fresh from every inventory response and dropped once the
//! merge step is done.

use serde::{Deserialize, Serialize};

/// A load balancer and everything it routes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub ports: Vec<Port>,
}

/// A listening port; maps to one frontend and one backend section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub address_family: String,
    pub number: u16,
    pub pools: Vec<Pool>,
}

/// A group of origins behind a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub protocol: String,
    pub origins: Vec<Origin>,
}

/// A single upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub id: String,
    pub name: String,
    pub target: String,
    pub port_number: u16,
    pub active: bool,
}
