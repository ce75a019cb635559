//! Network descriptors and the attach/detach orchestrator (spec.md §4.G).
//!
//! Namespace entry follows the same "pin the OS thread, `setns`, restore
//! on drop" shape the teacher uses for PID-namespace entry in its exec
//! path, generalized here to the network namespace and to netlink calls
//! that must run inside the target namespace.

use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use futures::stream::TryStreamExt;
use nix::sched::{setns, CloneFlags};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::{self, BridgeDriver};
use crate::error::{MydockerError, Result};
use crate::ipam::{Ipam, Subnet};
use crate::paths;

pub const DEFAULT_NETWORK: &str = "mydocker0";
pub const DEFAULT_SUBNET: &str = "172.18.0.0/24";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub name: String,
    pub subnet: String,
    pub gateway: String,
    pub driver: String,
}

impl NetworkDescriptor {
    pub fn parsed_subnet(&self) -> Result<Subnet> {
        Subnet::parse(&self.subnet)
    }
}

pub fn save_network(net: &NetworkDescriptor) -> Result<()> {
    crate::state::write_json(&paths::network_descriptor_path(&net.name), net)
}

pub fn load_network(name: &str) -> Result<NetworkDescriptor> {
    let path = paths::network_descriptor_path(name);
    if !path.is_file() {
        return Err(MydockerError::NotFound(format!("network not found: {name}")));
    }
    crate::state::read_json(&path)
}

pub fn list_networks() -> Vec<NetworkDescriptor> {
    paths::walk_json_files(&paths::network_descriptor_dir())
        .into_iter()
        .filter_map(|p| crate::state::read_json(&p).ok())
        .collect()
}

pub fn remove_network_descriptor(name: &str) -> Result<()> {
    let path = paths::network_descriptor_path(name);
    std::fs::remove_file(&path).map_err(|e| MydockerError::persistence(path, e))
}

/// Resolves a network by name, auto-provisioning the default network the
/// first time it is requested. `"host"` is explicitly rejected: this
/// runtime has no host-networking mode.
pub async fn resolve_network(handle: rtnetlink::Handle, name: &str, ipam: &Ipam) -> Result<NetworkDescriptor> {
    let name = if name.is_empty() { DEFAULT_NETWORK } else { name };
    if name == "host" {
        return Err(MydockerError::UserInput("host networking is not supported".into()));
    }
    if name == DEFAULT_NETWORK {
        if let Ok(existing) = load_network(name) {
            return Ok(existing);
        }
        return create_network(handle, DEFAULT_SUBNET, name, ipam).await;
    }
    load_network(name)
}

/// `network create`: allocates the gateway address, provisions the
/// bridge, and persists the descriptor.
pub async fn create_network(handle: rtnetlink::Handle, subnet_cidr: &str, name: &str, ipam: &Ipam) -> Result<NetworkDescriptor> {
    if paths::network_descriptor_path(name).is_file() {
        return Err(MydockerError::AlreadyExists(format!("network already exists: {name}")));
    }
    let subnet = Subnet::parse(subnet_cidr)?;
    let driver = BridgeDriver::new(handle);
    driver.create(&subnet, name).await?;
    // Reserve the gateway address (index 1) so a later Allocate never
    // hands it out to a container.
    let gateway = ipam.allocate(&subnet)?;

    let descriptor = NetworkDescriptor {
        name: name.to_string(),
        subnet: subnet.cidr_string(),
        gateway: gateway.to_string(),
        driver: "bridge".to_string(),
    };
    save_network(&descriptor)?;
    Ok(descriptor)
}

/// `network remove`: deletes the bridge and releases its subnet in IPAM.
pub async fn remove_network(handle: rtnetlink::Handle, name: &str, ipam: &Ipam) -> Result<()> {
    let descriptor = load_network(name)?;
    let subnet = descriptor.parsed_subnet()?;
    let driver = BridgeDriver::new(handle);
    driver.delete(name).await?;
    ipam.release_subnet(&subnet)?;
    remove_network_descriptor(name)
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub ip_address: Ipv4Addr,
    pub network: NetworkDescriptor,
    pub port_mapping: Vec<String>,
}

impl Endpoint {
    pub fn new(container_id: &str, network: NetworkDescriptor, ip_address: Ipv4Addr, port_mapping: Vec<String>) -> Self {
        Endpoint {
            id: format!("{container_id}-{}", network.name),
            ip_address,
            network,
            port_mapping,
        }
    }
}

/// Attaches a container's network namespace to `network`: allocates an
/// address, wires the veth pair to the bridge, then enters the
/// container's netns to finish configuration on the peer side.
pub async fn attach(
    handle: rtnetlink::Handle,
    pid: i32,
    network_name: &str,
    container_id: &str,
    port_mapping: Vec<String>,
    ipam: &Ipam,
) -> Result<Endpoint> {
    let network = resolve_network(handle.clone(), network_name, ipam).await?;
    let subnet = network.parsed_subnet()?;
    let ip = ipam.allocate(&subnet)?;

    let driver = BridgeDriver::new(handle.clone());
    let endpoint = Endpoint::new(container_id, network.clone(), ip, port_mapping);
    let (_host_side, peer) = driver.connect(&network.name, &endpoint.id).await?;

    move_and_configure_peer(&handle, pid, &peer, ip, subnet.prefix_len, network.gateway.parse().map_err(|_| {
        MydockerError::Persistence {
            path: paths::network_descriptor_path(&network.name),
            source: Box::new(std::io::Error::other("invalid stored gateway")),
        }
    })?)
    .await?;

    for mapping in &endpoint.port_mapping {
        let (host_port, container_port) = mapping
            .split_once(':')
            .ok_or_else(|| MydockerError::UserInput(format!("port mapping must be HOST:CONTAINER, got {mapping}")))?;
        bridge::install_dnat(host_port, ip, container_port)?;
    }

    Ok(endpoint)
}

/// Detaches a container from its network: deletes the host-side veth.
/// The peer vanished already when the container's netns was torn down.
pub async fn detach(handle: rtnetlink::Handle, container_id: &str, network_name: &str) -> Result<()> {
    let endpoint_id = format!("{container_id}-{network_name}");
    BridgeDriver::new(handle).disconnect(&endpoint_id).await
}

/// Moves `peer` into the network namespace of `pid`, then configures its
/// address, brings it and `lo` up, and installs the default route.
///
/// A netlink socket's namespace affiliation is fixed at the moment it is
/// created and is untouched by a later `setns()` on some thread, and a
/// multi-threaded tokio runtime is free to resume an `.await` on a
/// different OS thread than the one that called `setns()` in the first
/// place. So the host `handle` (bound to the host netns) can only be used
/// for the move itself; the configuration calls that must land inside the
/// container's netns are done through a brand new netlink connection,
/// opened only after `setns()`, on one dedicated blocking-pool thread that
/// never yields back to the async scheduler mid-namespace-entry.
async fn move_and_configure_peer(
    handle: &rtnetlink::Handle,
    pid: i32,
    peer: &str,
    ip: Ipv4Addr,
    prefix_len: u8,
    gateway: Ipv4Addr,
) -> Result<()> {
    let mut links = handle.link().get().match_name(peer.to_string()).execute();
    let peer_link = links
        .try_next()
        .await
        .map_err(|e| MydockerError::system_call(format!("link get {peer}"), e))?
        .ok_or_else(|| MydockerError::NotFound(format!("veth peer not found: {peer}")))?;
    let peer_index = peer_link.header.index;

    let target_ns = std::fs::File::open(format!("/proc/{pid}/ns/net"))
        .map_err(|e| MydockerError::system_call(format!("open /proc/{pid}/ns/net"), e))?;

    handle
        .link()
        .set(peer_index)
        .setns_by_fd(target_ns.as_raw_fd())
        .execute()
        .await
        .map_err(|e| MydockerError::system_call(format!("move {peer} into netns of pid {pid}"), e))?;

    let peer = peer.to_string();
    tokio::task::spawn_blocking(move || configure_peer_in_netns(target_ns, &peer, ip, prefix_len, gateway))
        .await
        .map_err(|e| MydockerError::system_call("join netns configuration task", std::io::Error::other(e)))?
}

/// Runs entirely on one dedicated blocking-pool thread: enters the
/// container's netns via `setns`, opens a fresh netlink connection (bound
/// to that netns because it is created after the `setns`, not before),
/// configures the peer, then restores this thread's original namespace
/// before returning it to tokio's blocking pool for reuse.
fn configure_peer_in_netns(target_ns: std::fs::File, peer: &str, ip: Ipv4Addr, prefix_len: u8, gateway: Ipv4Addr) -> Result<()> {
    let guard = NetnsGuard::enter(target_ns)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| MydockerError::system_call("build netns-local tokio runtime", e))?;

    let result = rt.block_on(configure_in_target_ns(peer, ip, prefix_len, gateway));
    drop(guard);
    result
}

async fn configure_in_target_ns(peer: &str, ip: Ipv4Addr, prefix_len: u8, gateway: Ipv4Addr) -> Result<()> {
    let (connection, handle, _) = rtnetlink::new_connection()
        .map_err(|e| MydockerError::system_call("open netlink connection inside container netns", e))?;
    tokio::spawn(connection);

    let mut links = handle.link().get().match_name(peer.to_string()).execute();
    let peer_link = links
        .try_next()
        .await
        .map_err(|e| MydockerError::system_call(format!("link get {peer} inside container netns"), e))?
        .ok_or_else(|| MydockerError::NotFound(format!("veth peer not found inside container netns: {peer}")))?;
    let peer_index = peer_link.header.index;

    handle
        .address()
        .add(peer_index, std::net::IpAddr::V4(ip), prefix_len)
        .execute()
        .await
        .map_err(|e| MydockerError::system_call(format!("assign {ip} to {peer}"), e))?;

    handle
        .link()
        .set(peer_index)
        .up()
        .execute()
        .await
        .map_err(|e| MydockerError::system_call(format!("set {peer} up"), e))?;

    if let Some(lo) = handle
        .link()
        .get()
        .match_name("lo".to_string())
        .execute()
        .try_next()
        .await
        .map_err(|e| MydockerError::system_call("link get lo", e))?
    {
        handle
            .link()
            .set(lo.header.index)
            .up()
            .execute()
            .await
            .map_err(|e| MydockerError::system_call("set lo up", e))?;
    }

    handle
        .route()
        .add()
        .v4()
        .destination_prefix(Ipv4Addr::new(0, 0, 0, 0), 0)
        .gateway(gateway)
        .output_interface(peer_index)
        .execute()
        .await
        .map_err(|e| MydockerError::system_call(format!("add default route via {gateway}"), e))?;

    debug!(peer, %ip, %gateway, "peer interface configured inside container netns");
    Ok(())
}

/// Pins the calling OS thread to the target network namespace for the
/// lifetime of the guard; restores the original namespace on drop.
struct NetnsGuard {
    original: std::fs::File,
}

impl NetnsGuard {
    fn enter(target: std::fs::File) -> Result<Self> {
        let original = std::fs::File::open("/proc/self/ns/net")
            .map_err(|e| MydockerError::system_call("open /proc/self/ns/net", e))?;
        setns(target.as_raw_fd(), CloneFlags::CLONE_NEWNET)
            .map_err(|e| MydockerError::system_call("setns into container netns", e))?;
        Ok(NetnsGuard { original })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(e) = setns(self.original.as_raw_fd(), CloneFlags::CLONE_NEWNET) {
            tracing::warn!(error = %e, "failed to restore original network namespace");
        }
    }
}

pub fn network_descriptor_path(name: &str) -> PathBuf {
    paths::network_descriptor_path(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_id_is_container_and_network_joined() {
        let network = NetworkDescriptor {
            name: "mydocker0".into(),
            subnet: "172.18.0.0/24".into(),
            gateway: "172.18.0.1".into(),
            driver: "bridge".into(),
        };
        let endpoint = Endpoint::new("abc123", network, "172.18.0.2".parse().unwrap(), vec![]);
        assert_eq!(endpoint.id, "abc123-mydocker0");
    }
}
