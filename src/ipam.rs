//! IP address manager: a persistent bitmap allocator per subnet
//! (spec.md §4.E).
//!
//! The on-disk bitmap is kept as a string of `'0'`/`'1'` characters, as
//! the original does, rather than migrated to a packed bitset: this
//! crate's subnets are small (the design targets /24s) and the string
//! form keeps `network/ipam/subnet.json` human-readable for debugging,
//! per the option spec.md §9 leaves open.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{MydockerError, Result};
use crate::paths;
use crate::state::{read_json, write_json};

#[derive(Debug, Clone)]
pub struct Subnet {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl Subnet {
    pub fn parse(cidr: &str) -> Result<Self> {
        let (ip_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| MydockerError::UserInput(format!("not a CIDR: {cidr}")))?;
        let addr: Ipv4Addr = ip_str
            .parse()
            .map_err(|_| MydockerError::UserInput(format!("invalid address in CIDR: {cidr}")))?;
        let prefix_len: u8 = prefix_str
            .parse()
            .map_err(|_| MydockerError::UserInput(format!("invalid prefix in CIDR: {cidr}")))?;
        if prefix_len > 32 {
            return Err(MydockerError::UserInput(format!("invalid prefix in CIDR: {cidr}")));
        }
        let mask = if prefix_len == 0 { 0u32 } else { u32::MAX << (32 - prefix_len) };
        let network = Ipv4Addr::from(ipv4_to_uint(addr) & mask);
        Ok(Subnet { network, prefix_len })
    }

    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix_len as u32)
    }

    pub fn cidr_string(&self) -> String {
        format!("{}/{}", self.network, self.prefix_len)
    }

    /// The first host address (`.1`): the low bit of the network
    /// address's last octet set to 1, used both as the gateway and as
    /// `ParseFirstIP` in spec.md §8.
    pub fn first_ip(&self) -> Ipv4Addr {
        let mut octets = self.network.octets();
        octets[3] |= 1;
        Ipv4Addr::from(octets)
    }
}

pub fn ipv4_to_uint(ip: Ipv4Addr) -> u32 {
    u32::from_be_bytes(ip.octets())
}

pub fn uint_to_ipv4(n: u32) -> Ipv4Addr {
    Ipv4Addr::from(n.to_be_bytes())
}

/// Returns the index of the first `'0'` strictly between the first and
/// last character of `bits` (indices 0 and `len-1` are reserved: network
/// and broadcast). Mirrors the original's `GetChar`.
pub fn get_char(bits: &str, target: u8) -> Result<usize> {
    let bytes = bits.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if i == 0 || i == bytes.len() - 1 {
            continue;
        }
        if b == target {
            return Ok(i);
        }
    }
    Err(MydockerError::NoFreeAddresses)
}

/// Sets `bits[n]` to `value`, matching the original's `SetChar` bounds
/// check and error message.
pub fn set_char(n: usize, bits: &mut String, value: u8) -> Result<()> {
    if n >= bits.len() {
        return Err(MydockerError::UserInput(format!(
            "bitStr.Set: index {n} out of range [0-{}]",
            bits.len().saturating_sub(1)
        )));
    }
    let mut bytes = bits.as_bytes().to_vec();
    bytes[n] = value;
    *bits = String::from_utf8(bytes).expect("bitmap stays ASCII");
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IpamState(HashMap<String, String>);

pub struct Ipam {
    path: PathBuf,
    state: Mutex<()>,
}

impl Default for Ipam {
    fn default() -> Self {
        Self::new(paths::ipam_state_path())
    }
}

impl Ipam {
    pub fn new(path: PathBuf) -> Self {
        Ipam { path, state: Mutex::new(()) }
    }

    fn load(&self) -> IpamState {
        read_json(&self.path).unwrap_or_default()
    }

    fn dump(&self, state: &IpamState) -> Result<()> {
        write_json(&self.path, state)
    }

    /// Allocates the first free address in `subnet`, creating a fresh
    /// all-zero bitmap the first time the subnet is seen.
    pub fn allocate(&self, subnet: &Subnet) -> Result<Ipv4Addr> {
        let _guard = self.state.lock().unwrap();
        let mut state = self.load();
        let key = subnet.cidr_string();
        let bits = state
            .0
            .entry(key.clone())
            .or_insert_with(|| "0".repeat(subnet.size() as usize));
        let index = get_char(bits, b'0')?;
        set_char(index, bits, b'1')?;
        let ip = uint_to_ipv4(ipv4_to_uint(subnet.network) | index as u32);
        self.dump(&state)?;
        Ok(ip)
    }

    /// Releases a previously allocated address back to the pool.
    pub fn release(&self, subnet: &Subnet, ip: Ipv4Addr) -> Result<()> {
        let _guard = self.state.lock().unwrap();
        let mut state = self.load();
        let key = subnet.cidr_string();
        let index = (ipv4_to_uint(ip) - ipv4_to_uint(subnet.network)) as usize;
        if let Some(bits) = state.0.get_mut(&key) {
            set_char(index, bits, b'0')?;
        }
        self.dump(&state)
    }

    /// Forgets a subnet entirely, releasing every address it held.
    pub fn release_subnet(&self, subnet: &Subnet) -> Result<()> {
        let _guard = self.state.lock().unwrap();
        let mut state = self.load();
        state.0.remove(&subnet.cidr_string());
        self.dump(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ipam() -> Ipam {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subnet.json");
        std::mem::forget(dir);
        Ipam::new(path)
    }

    #[test]
    fn set_char_out_of_range_errors() {
        let mut s = "000".to_string();
        let err = set_char(3, &mut s, b'1').unwrap_err();
        assert!(err.to_string().contains("out of range [0-2]"));
    }

    #[test]
    fn set_char_in_range() {
        let mut s = "000".to_string();
        set_char(0, &mut s, b'1').unwrap();
        assert_eq!(s, "100");
    }

    #[test]
    fn get_char_skips_reserved_indices() {
        assert!(get_char("0abc", b'0').is_err());
        assert_eq!(get_char("abc0def", b'0').unwrap(), 3);
    }

    #[test]
    fn ipv4_uint_roundtrip() {
        for raw in [0u32, 1, 0x0a000001, u32::MAX, 0xc0a80001] {
            let ip = uint_to_ipv4(raw);
            assert_eq!(ipv4_to_uint(ip), raw);
        }
    }

    #[test]
    fn parse_first_ip_sets_low_bit() {
        let subnet = Subnet::parse("10.0.0.0/24").unwrap();
        assert_eq!(subnet.first_ip(), "10.0.0.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn allocate_then_release_then_reallocate() {
        let ipam = temp_ipam();
        let subnet = Subnet::parse("172.18.0.0/24").unwrap();
        let first = ipam.allocate(&subnet).unwrap();
        assert_eq!(first, "172.18.0.1".parse::<Ipv4Addr>().unwrap());
        let second = ipam.allocate(&subnet).unwrap();
        assert_eq!(second, "172.18.0.2".parse::<Ipv4Addr>().unwrap());
        ipam.release(&subnet, first).unwrap();
        let third = ipam.allocate(&subnet).unwrap();
        assert_eq!(third, "172.18.0.1".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn allocate_bounds_stay_within_open_interval() {
        let ipam = temp_ipam();
        let subnet = Subnet::parse("172.18.0.0/30").unwrap();
        // size = 4, valid indices are 1 and 2 only.
        let a = ipam.allocate(&subnet).unwrap();
        let b = ipam.allocate(&subnet).unwrap();
        let a_idx = ipv4_to_uint(a) - ipv4_to_uint(subnet.network);
        let b_idx = ipv4_to_uint(b) - ipv4_to_uint(subnet.network);
        assert!((1..=2).contains(&a_idx));
        assert!((1..=2).contains(&b_idx));
        assert!(ipam.allocate(&subnet).is_err());
    }
}
