//! Bridge network driver (spec.md §4.F).
//!
//! Link and address management goes through `rtnetlink`, the same crate
//! `other_examples/manifests/Yinwhe-Rtain` reaches for; iptables rules are
//! installed by shelling out to the `iptables` binary, mirroring the
//! original's `exec.Command("iptables", ...)` rather than pulling in a
//! netfilter-binding crate.

use std::net::Ipv4Addr;
use std::process::Command;

use futures::stream::TryStreamExt;
use rtnetlink::Handle;
use tracing::debug;

use crate::error::{MydockerError, Result};
use crate::ipam::Subnet;

pub struct BridgeDriver {
    handle: Handle,
}

impl BridgeDriver {
    pub fn new(handle: Handle) -> Self {
        BridgeDriver { handle }
    }

    async fn link_index(&self, name: &str) -> Result<Option<u32>> {
        let mut links = self.handle.link().get().match_name(name.to_string()).execute();
        match links.try_next().await {
            Ok(Some(link)) => Ok(Some(link.header.index)),
            Ok(None) => Ok(None),
            Err(rtnetlink::Error::NetlinkError(e)) if e.code.map(|c| c.get()) == Some(-19) => Ok(None),
            Err(e) => Err(MydockerError::system_call(format!("link get {name}"), e)),
        }
    }

    /// Creates the bridge if it does not already exist (idempotent, to
    /// support auto-provisioning the default network), assigns it the
    /// subnet's first host address, and installs the MASQUERADE rule.
    pub async fn create(&self, subnet: &Subnet, name: &str) -> Result<()> {
        if self.link_index(name).await?.is_none() {
            self.handle
                .link()
                .add()
                .bridge(name.to_string())
                .execute()
                .await
                .map_err(|e| MydockerError::system_call(format!("create bridge {name}"), e))?;
        }
        let index = self
            .link_index(name)
            .await?
            .ok_or_else(|| MydockerError::NotFound(format!("bridge {name} not found after create")))?;

        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(|e| MydockerError::system_call(format!("set {name} up"), e))?;

        let gateway = subnet.first_ip();
        self.handle
            .address()
            .add(index, std::net::IpAddr::V4(gateway), subnet.prefix_len)
            .execute()
            .await
            .map_err(|e| MydockerError::system_call(format!("assign {gateway} to {name}"), e))?;

        install_masquerade(&subnet.cidr_string(), name)
    }

    /// Deletes the bridge link. NAT rule cleanup is best-effort and is not
    /// attempted here, per spec.md §4.F's documented limitation.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if let Some(index) = self.link_index(name).await? {
            self.handle
                .link()
                .del(index)
                .execute()
                .await
                .map_err(|e| MydockerError::system_call(format!("delete bridge {name}"), e))?;
        }
        Ok(())
    }

    /// Creates a veth pair, names derived from the first five characters
    /// of the endpoint id, and attaches the host side to the bridge.
    pub async fn connect(&self, bridge_name: &str, endpoint_id: &str) -> Result<(String, String)> {
        let (host_side, peer) = veth_names(endpoint_id);
        self.handle
            .link()
            .add()
            .veth(host_side.clone(), peer.clone())
            .execute()
            .await
            .map_err(|e| MydockerError::system_call(format!("create veth {host_side}/{peer}"), e))?;

        let bridge_index = self
            .link_index(bridge_name)
            .await?
            .ok_or_else(|| MydockerError::NotFound(format!("bridge not found: {bridge_name}")))?;
        let host_index = self
            .link_index(&host_side)
            .await?
            .ok_or_else(|| MydockerError::NotFound(format!("veth not found after create: {host_side}")))?;

        self.handle
            .link()
            .set(host_index)
            .controller(bridge_index)
            .execute()
            .await
            .map_err(|e| MydockerError::system_call(format!("attach {host_side} to {bridge_name}"), e))?;
        self.handle
            .link()
            .set(host_index)
            .up()
            .execute()
            .await
            .map_err(|e| MydockerError::system_call(format!("set {host_side} up"), e))?;

        debug!(host_side, peer, bridge_name, "veth pair attached");
        Ok((host_side, peer))
    }

    /// Detaches and deletes the host-side veth, reconstructed from the
    /// endpoint id; the peer end disappears with the container netns.
    pub async fn disconnect(&self, endpoint_id: &str) -> Result<()> {
        let (host_side, _) = veth_names(endpoint_id);
        if let Some(index) = self.link_index(&host_side).await? {
            self.handle
                .link()
                .del(index)
                .execute()
                .await
                .map_err(|e| MydockerError::system_call(format!("delete veth {host_side}"), e))?;
        }
        Ok(())
    }
}

/// Host side is the first five characters of the endpoint id, peer is
/// `"cif-"` + those same five characters (spec.md §3/§4.F).
pub fn veth_names(endpoint_id: &str) -> (String, String) {
    let first_five = crate::paths::first_n(endpoint_id, 5);
    (first_five.to_string(), format!("cif-{first_five}"))
}

fn install_masquerade(cidr: &str, bridge_name: &str) -> Result<()> {
    run_iptables(&["-t", "nat", "-A", "POSTROUTING", "-s", cidr, "!", "-o", bridge_name, "-j", "MASQUERADE"])
}

pub fn install_dnat(host_port: &str, container_ip: Ipv4Addr, container_port: &str) -> Result<()> {
    run_iptables(&[
        "-t",
        "nat",
        "-A",
        "PREROUTING",
        "-p",
        "tcp",
        "--dport",
        host_port,
        "-j",
        "DNAT",
        "--to-destination",
        &format!("{container_ip}:{container_port}"),
    ])
}

fn run_iptables(args: &[&str]) -> Result<()> {
    let output = Command::new("iptables")
        .args(args)
        .output()
        .map_err(|e| MydockerError::system_call("spawn iptables", e))?;
    if !output.status.success() {
        return Err(MydockerError::system_call(
            format!("iptables {}", args.join(" ")),
            std::io::Error::other(String::from_utf8_lossy(&output.stderr).into_owned()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veth_names_use_first_five_chars() {
        let (host, peer) = veth_names("abcdefgh-mydocker0");
        assert_eq!(host, "abcde");
        assert_eq!(peer, "cif-abcde");
    }
}
