//! GraphQL wire format of the inventory API.
//!
//! The API returns connections wrapped in `edges { node { .. } }`; these types
//! mirror that shape and convert into the flat graph in `types.rs`.

use serde::{Deserialize, Serialize};

use crate::inventory::types::{LoadBalancer, Origin, Pool, Port};

pub const GET_LOAD_BALANCER_QUERY: &str = "query GetLoadBalancer($id: ID!) { \
loadBalancer(id: $id) { id name ports { edges { node { id name addressFamily number \
pools { id name protocol origins { edges { node { id name target portNumber active } } } } \
} } } } }";

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub query: &'static str,
    pub variables: Variables<'a>,
}

#[derive(Debug, Serialize)]
pub struct Variables<'a> {
    pub id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Response {
    pub data: Option<GetLoadBalancerData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLoadBalancerData {
    pub load_balancer: Option<LoadBalancerNode>,
}

#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Deserialize)]
pub struct LoadBalancerNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub ports: Option<Connection<PortNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_address_family")]
    pub address_family: String,
    pub number: u16,
    #[serde(default)]
    pub pools: Vec<PoolNode>,
}

fn default_address_family() -> String {
    "ipv4".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PoolNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    pub origins: Option<Connection<OriginNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub target: String,
    pub port_number: u16,
    pub active: bool,
}

impl From<LoadBalancerNode> for LoadBalancer {
    fn from(node: LoadBalancerNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            ports: nodes(node.ports).map(Port::from).collect(),
        }
    }
}

impl From<PortNode> for Port {
    fn from(node: PortNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            address_family: node.address_family,
            number: node.number,
            pools: node.pools.into_iter().map(Pool::from).collect(),
        }
    }
}

impl From<PoolNode> for Pool {
    fn from(node: PoolNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            protocol: node.protocol,
            origins: nodes(node.origins).map(Origin::from).collect(),
        }
    }
}

impl From<OriginNode> for Origin {
    fn from(node: OriginNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            target: node.target,
            port_number: node.port_number,
            active: node.active,
        }
    }
}

fn nodes<T>(connection: Option<Connection<T>>) -> impl Iterator<Item = T> {
    connection
        .into_iter()
        .flat_map(|c| c.edges)
        .map(|edge| edge.node)
}
