//! Forwarding rules between virtual networks.

use std::net::Ipv4Addr;

use crate::net::Ipv4Net;
use crate::{Error, Result};

/// A route from `src` to `dst` via a gateway address that must live
/// inside `src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VRoute {
    pub src: Ipv4Net,
    pub dst: Ipv4Net,
    pub gateway: Ipv4Addr,
}

impl VRoute {
    pub fn new(src: Ipv4Net, dst: Ipv4Net, gateway: Ipv4Addr) -> Result<Self> {
        if !src.contains(gateway) {
            return Err(Error::InvalidParameter(format!(
                "gateway {gateway} is not inside source network {src}"
            )));
        }
        Ok(Self { src, dst, gateway })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_must_be_inside_source() {
        let src: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let dst: Ipv4Net = "10.0.1.0/24".parse().unwrap();

        VRoute::new(src, dst, Ipv4Addr::new(10, 0, 0, 254)).unwrap();
        let err = VRoute::new(src, dst, Ipv4Addr::new(10, 0, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
