//! Merge of a desired-state graph into a base configuration.
//!
//! Each port becomes a frontend and a backend section labeled with the port
//! id. Every origin of every pool of the port becomes a server line in that
//! backend. The output depends only on the inputs, so merging the same base
//! and graph twice renders byte-identical documents.

use crate::haproxy::document::{ConfigDocument, Directive, SectionKind};
use crate::haproxy::MergeError;
use crate::inventory::{LoadBalancer, Origin};

/// Fold `lb` into `config` and return the result.
pub fn merge_config(mut config: ConfigDocument, lb: &LoadBalancer) -> Result<ConfigDocument, MergeError> {
    for port in &lb.ports {
        let label = port.id.as_str();

        config
            .create_section(SectionKind::Frontend, label)
            .map_err(|source| MergeError::FrontendSection {
                label: label.to_string(),
                source,
            })?;

        config
            .insert(
                SectionKind::Frontend,
                label,
                Directive::new("bind", format!("{}@:{}", port.address_family, port.number)),
            )
            .map_err(|source| MergeError::Bind {
                label: label.to_string(),
                source,
            })?;

        // map frontend to backend
        config
            .set(SectionKind::Frontend, label, Directive::new("use_backend", label))
            .map_err(|source| MergeError::UseBackend {
                label: label.to_string(),
                source,
            })?;

        config
            .create_section(SectionKind::Backend, label)
            .map_err(|source| MergeError::BackendSection {
                label: label.to_string(),
                source,
            })?;

        for origin in port.pools.iter().flat_map(|pool| &pool.origins) {
            config
                .set_server(label, &origin.id, &server_address(origin))
                .map_err(|source| MergeError::Server {
                    label: label.to_string(),
                    source,
                })?;
        }
    }

    Ok(config)
}

/// Address part of a server line; inactive origins stay listed but disabled.
pub fn server_address(origin: &Origin) -> String {
    let mut address = format!(
        "{}:{} check port {}",
        origin.target, origin.port_number, origin.port_number
    );
    if !origin.active {
        address.push_str(" disabled");
    }
    address
}
