//! IPv4 CIDR arithmetic for the address allocator.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Error, Result};

/// An IPv4 network block (`address/prefix`), normalized to its network
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Net {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Net {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::InvalidParameter(format!("prefix /{prefix}")));
        }
        let mask = Self::mask_u32(prefix);
        Ok(Self { network: Ipv4Addr::from(u32::from(address) & mask), prefix })
    }

    fn mask_u32(prefix: u8) -> u32 {
        if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(Self::mask_u32(self.prefix))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !Self::mask_u32(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_u32(self.prefix) == u32::from(self.network)
    }

    /// Total number of addresses in the block, network and broadcast
    /// included.
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix)
    }

    /// Whether two blocks share any address.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other.network) || other.contains(self.network)
    }
}

impl fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Net {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) =
            s.split_once('/').ok_or_else(|| Error::InvalidParameter(s.to_string()))?;
        let addr: Ipv4Addr =
            addr.parse().map_err(|_| Error::InvalidParameter(s.to_string()))?;
        let prefix: u8 =
            prefix.parse().map_err(|_| Error::InvalidParameter(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_to_network_address() {
        let net: Ipv4Net = "10.0.0.42/24".parse().unwrap();
        assert_eq!(net.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(net.prefix(), 24);
        assert_eq!(net.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn broadcast_and_containment() {
        let net: Ipv4Net = "192.168.4.0/22".parse().unwrap();
        assert_eq!(net.broadcast(), Ipv4Addr::new(192, 168, 7, 255));
        assert!(net.contains(Ipv4Addr::new(192, 168, 5, 1)));
        assert!(!net.contains(Ipv4Addr::new(192, 168, 8, 1)));
        assert_eq!(net.size(), 1024);
    }

    #[test]
    fn rejects_malformed_blocks() {
        assert!("10.0.0.0".parse::<Ipv4Net>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Net>().is_err());
        assert!("300.0.0.0/8".parse::<Ipv4Net>().is_err());
    }

    #[test]
    fn overlap_detection() {
        let a: Ipv4Net = "10.0.0.0/16".parse().unwrap();
        let b: Ipv4Net = "10.0.4.0/24".parse().unwrap();
        let c: Ipv4Net = "10.1.0.0/16".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }
}
