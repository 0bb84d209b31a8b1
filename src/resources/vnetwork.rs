//! Virtual networks and their address allocator.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use crate::net::Ipv4Net;
use crate::{Error, Result};

use super::vroute::VRoute;

/// Hands out unique host addresses inside one network's CIDR block.
///
/// A monotonic cursor walks the block; freed addresses become eligible again
/// on a later pass (no lowest-first preference beyond cursor order). The
/// network and broadcast addresses are never handed out.
#[derive(Debug)]
pub struct AddressPool {
    net: Ipv4Net,
    cursor: u32,
    used: HashSet<Ipv4Addr>,
}

impl AddressPool {
    pub fn new(net: Ipv4Net) -> Self {
        Self { net, cursor: 0, used: HashSet::new() }
    }

    fn host_count(&self) -> u32 {
        // /31 and /32 blocks have no usable host addresses here
        self.net.size().saturating_sub(2) as u32
    }

    /// Auto-assigns the next free address, wrapping once over the whole
    /// block before failing.
    pub fn allocate(&mut self) -> Result<Ipv4Addr> {
        let hosts = self.host_count();
        let base = u32::from(self.net.network()) + 1;
        for _ in 0..hosts {
            let candidate = Ipv4Addr::from(base + self.cursor);
            self.cursor = (self.cursor + 1) % hosts;
            if self.used.insert(candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::Unavailable(format!("no free address in {}", self.net)))
    }

    /// Claims a specific address.
    pub fn claim(&mut self, addr: Ipv4Addr) -> Result<()> {
        if !self.net.contains(addr) || addr == self.net.network() || addr == self.net.broadcast()
        {
            return Err(Error::InvalidParameter(format!("{addr} is not a host of {}", self.net)));
        }
        if !self.used.insert(addr) {
            return Err(Error::AlreadyExisting(format!("address {addr}")));
        }
        Ok(())
    }

    pub fn release(&mut self, addr: Ipv4Addr) {
        self.used.remove(&addr);
    }

    pub fn is_used(&self, addr: Ipv4Addr) -> bool {
        self.used.contains(&addr)
    }
}

/// An address block plus its member interfaces and route table.
#[derive(Debug)]
pub struct VNetwork {
    pub name: String,
    pub subnet: Ipv4Net,
    /// member vnode name -> its interface id on this network
    pub members: HashMap<String, u32>,
    /// destination subnet -> route; at most one route per destination
    pub routes: HashMap<Ipv4Net, VRoute>,
    pub pool: AddressPool,
}

impl VNetwork {
    pub fn new(name: &str, subnet: Ipv4Net) -> Self {
        Self {
            name: name.to_string(),
            subnet,
            members: HashMap::new(),
            routes: HashMap::new(),
            pool: AddressPool::new(subnet),
        }
    }

    pub fn add_route(&mut self, route: VRoute) -> Result<()> {
        if route.src != self.subnet {
            return Err(Error::InvalidParameter(format!(
                "route source {} does not match network {}",
                route.src, self.subnet
            )));
        }
        if self.routes.contains_key(&route.dst) {
            return Err(Error::AlreadyExisting(format!("route to {}", route.dst)));
        }
        self.routes.insert(route.dst, route);
        Ok(())
    }

    pub fn remove_route(&mut self, dst: Ipv4Net) -> Option<VRoute> {
        self.routes.remove(&dst)
    }

    pub fn get_route(&self, dst: Ipv4Net) -> Option<&VRoute> {
        self.routes.get(&dst)
    }
}
