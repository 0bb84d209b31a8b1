//! The platform-wide resource graph.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, Result};

use super::pnode::PNode;
use super::vnetwork::VNetwork;
use super::vnode::VNode;
use super::vroute::VRoute;

/// Owns every physical node, virtual node and virtual network of the
/// emulated platform and keeps them mutually consistent.
///
/// Mutation is single-writer; callers serialize at the boundary.
#[derive(Debug, Default)]
pub struct VPlatform {
    pnodes: HashMap<IpAddr, PNode>,
    vnodes: HashMap<String, VNode>,
    vnetworks: HashMap<String, VNetwork>,
}

impl VPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pnode(&mut self, pnode: PNode) -> Result<()> {
        if self.pnodes.contains_key(&pnode.address) {
            return Err(Error::AlreadyExisting(format!("pnode {}", pnode.address)));
        }
        self.pnodes.insert(pnode.address, pnode);
        Ok(())
    }

    pub fn remove_pnode(&mut self, address: IpAddr) -> Result<PNode> {
        if self.vnodes.values().any(|n| n.host == address) {
            return Err(Error::InvalidParameter(format!("pnode {address} still hosts vnodes")));
        }
        self.pnodes.remove(&address).ok_or_else(|| Error::NotFound(format!("pnode {address}")))
    }

    pub fn get_pnode(&self, address: IpAddr) -> Result<&PNode> {
        self.pnodes.get(&address).ok_or_else(|| Error::NotFound(format!("pnode {address}")))
    }

    pub fn get_pnode_mut(&mut self, address: IpAddr) -> Result<&mut PNode> {
        self.pnodes.get_mut(&address).ok_or_else(|| Error::NotFound(format!("pnode {address}")))
    }

    /// Picks a physical node with enough free cores for the vnode's
    /// virtual CPU.
    pub fn get_pnode_available(&self, vnode: &VNode) -> Result<IpAddr> {
        let needed = vnode.vcpu.as_ref().map(|c| c.vcores.len()).unwrap_or(0);
        self.pnodes
            .values()
            .find(|p| p.cpu.free_count() >= needed)
            .map(|p| p.address)
            .ok_or_else(|| Error::Unavailable(format!("no pnode with {needed} free cores")))
    }

    pub fn add_vnode(&mut self, vnode: VNode) -> Result<()> {
        if self.vnodes.contains_key(&vnode.name) {
            return Err(Error::AlreadyExisting(format!("vnode {}", vnode.name)));
        }
        if !self.pnodes.contains_key(&vnode.host) {
            return Err(Error::NotFound(format!("pnode {}", vnode.host)));
        }
        self.vnodes.insert(vnode.name.clone(), vnode);
        Ok(())
    }

    /// Deletes a vnode and everything that references it: routes gatewayed
    /// through it, its network memberships and addresses, its core
    /// allocation. Borrowed ifb devices are not tracked here; the shaping
    /// algorithm's `undo` returns them to the host pool at the container
    /// layer.
    pub fn remove_vnode(&mut self, name: &str) -> Result<VNode> {
        let vnode =
            self.vnodes.remove(name).ok_or_else(|| Error::NotFound(format!("vnode {name}")))?;
        for iface in vnode.vifaces.values() {
            let (Some(netname), Some(addr)) = (&iface.vnetwork, iface.address) else {
                continue;
            };
            if let Some(net) = self.vnetworks.get_mut(netname) {
                net.routes.retain(|_, route| route.gateway != addr);
                net.pool.release(addr);
                net.members.remove(name);
            }
        }
        if let Some(pnode) = self.pnodes.get_mut(&vnode.host) {
            pnode.cpu.free_cores(name);
        }
        Ok(vnode)
    }

    pub fn get_vnode(&self, name: &str) -> Result<&VNode> {
        self.vnodes.get(name).ok_or_else(|| Error::NotFound(format!("vnode {name}")))
    }

    pub fn get_vnode_mut(&mut self, name: &str) -> Result<&mut VNode> {
        self.vnodes.get_mut(name).ok_or_else(|| Error::NotFound(format!("vnode {name}")))
    }

    pub fn vnodes(&self) -> impl Iterator<Item = &VNode> {
        self.vnodes.values()
    }

    pub fn add_vnetwork(&mut self, vnetwork: VNetwork) -> Result<()> {
        if self.vnetworks.contains_key(&vnetwork.name) {
            return Err(Error::AlreadyExisting(format!("vnetwork {}", vnetwork.name)));
        }
        if self.vnetworks.values().any(|n| n.subnet.overlaps(&vnetwork.subnet)) {
            return Err(Error::AlreadyExisting(format!("subnet {}", vnetwork.subnet)));
        }
        self.vnetworks.insert(vnetwork.name.clone(), vnetwork);
        Ok(())
    }

    /// Deletes a network, dropping routes elsewhere that pointed at it and
    /// detaching its members without re-triggering network-level cascades.
    pub fn remove_vnetwork(&mut self, name: &str) -> Result<VNetwork> {
        let net = self
            .vnetworks
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("vnetwork {name}")))?;
        for other in self.vnetworks.values_mut() {
            other.routes.remove(&net.subnet);
        }
        for (vnode_name, iface_id) in &net.members {
            if let Some(vnode) = self.vnodes.get_mut(vnode_name) {
                if let Some(iface) = vnode.vifaces.get_mut(iface_id) {
                    iface.vnetwork = None;
                    iface.address = None;
                }
            }
        }
        Ok(net)
    }

    pub fn get_vnetwork(&self, name: &str) -> Result<&VNetwork> {
        self.vnetworks.get(name).ok_or_else(|| Error::NotFound(format!("vnetwork {name}")))
    }

    pub fn get_vnetwork_mut(&mut self, name: &str) -> Result<&mut VNetwork> {
        self.vnetworks.get_mut(name).ok_or_else(|| Error::NotFound(format!("vnetwork {name}")))
    }

    pub fn vnetworks(&self) -> impl Iterator<Item = &VNetwork> {
        self.vnetworks.values()
    }

    /// Looks a network up by containment of an address.
    pub fn get_vnetwork_by_address(&self, addr: Ipv4Addr) -> Option<&VNetwork> {
        self.vnetworks.values().find(|n| n.subnet.contains(addr))
    }

    /// Resolves the source network by the route's gateway address and
    /// delegates insertion to it.
    pub fn add_vroute(&mut self, route: VRoute) -> Result<()> {
        let net = self
            .vnetworks
            .values_mut()
            .find(|n| n.subnet.contains(route.gateway))
            .ok_or_else(|| {
                Error::NotFound(format!("no vnetwork containing gateway {}", route.gateway))
            })?;
        net.add_route(route)
    }

    /// Attaches a vnode interface to a network, allocating (or claiming)
    /// an address. Fail-fast: a failed allocation leaves no membership
    /// behind.
    pub fn attach(
        &mut self,
        vnode: &str,
        iface_id: u32,
        vnetwork: &str,
        address: Option<Ipv4Addr>,
    ) -> Result<Ipv4Addr> {
        let net = self
            .vnetworks
            .get_mut(vnetwork)
            .ok_or_else(|| Error::NotFound(format!("vnetwork {vnetwork}")))?;
        let node =
            self.vnodes.get_mut(vnode).ok_or_else(|| Error::NotFound(format!("vnode {vnode}")))?;
        let iface = node
            .vifaces
            .get_mut(&iface_id)
            .ok_or_else(|| Error::NotFound(format!("viface id {iface_id} on {vnode}")))?;
        if iface.vnetwork.is_some() {
            return Err(Error::AlreadyExisting(format!(
                "viface {} on {vnode} is already attached",
                iface.name
            )));
        }
        if net.members.contains_key(vnode) {
            return Err(Error::AlreadyExisting(format!("vnode {vnode} on vnetwork {vnetwork}")));
        }

        let addr = match address {
            Some(addr) => {
                net.pool.claim(addr)?;
                addr
            }
            None => net.pool.allocate()?,
        };
        net.members.insert(vnode.to_string(), iface_id);
        iface.vnetwork = Some(vnetwork.to_string());
        iface.address = Some(addr);
        Ok(addr)
    }

    /// Detaches a vnode from a network, releasing its address.
    pub fn detach(&mut self, vnode: &str, vnetwork: &str) -> Result<()> {
        let net = self
            .vnetworks
            .get_mut(vnetwork)
            .ok_or_else(|| Error::NotFound(format!("vnetwork {vnetwork}")))?;
        let iface_id = net
            .members
            .remove(vnode)
            .ok_or_else(|| Error::NotFound(format!("vnode {vnode} on vnetwork {vnetwork}")))?;
        if let Some(node) = self.vnodes.get_mut(vnode) {
            if let Some(iface) = node.vifaces.get_mut(&iface_id) {
                if let Some(addr) = iface.address.take() {
                    net.pool.release(addr);
                }
                iface.vnetwork = None;
            }
        }
        Ok(())
    }
}
