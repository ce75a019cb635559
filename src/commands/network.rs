//! `network create|list|remove` (spec.md §6, §11 supplement: `list`
//! prints stored descriptors as JSON lines).

use tracing::info;

use crate::error::{MydockerError, Result};
use crate::ipam::Ipam;
use crate::network::{self, DEFAULT_NETWORK};

pub async fn create(netlink: rtnetlink::Handle, subnet: String, name: String) -> Result<()> {
    let ipam = Ipam::default();
    let descriptor = network::create_network(netlink, &subnet, &name, &ipam).await?;
    info!(name = %descriptor.name, subnet = %descriptor.subnet, "network created");
    Ok(())
}

pub fn list() {
    for descriptor in network::list_networks() {
        match serde_json::to_string(&descriptor) {
            Ok(line) => println!("{line}"),
            Err(_) => continue,
        }
    }
}

pub async fn remove(netlink: rtnetlink::Handle, name: String) -> Result<()> {
    if name == DEFAULT_NETWORK {
        return Err(MydockerError::UserInput(format!("{DEFAULT_NETWORK} is undeletable")));
    }
    let ipam = Ipam::default();
    network::remove_network(netlink, &name, &ipam).await
}
