//! Reachability and automatic gateway-route inference over the graph.

use std::collections::{HashSet, VecDeque};

use crate::{Error, Result};

use super::platform::VPlatform;
use super::vroute::VRoute;

/// Networks further apart than this are treated as unreachable.
pub const MAX_HOPS: usize = 32;

/// Explicit breadth-first search over the network adjacency implied by
/// interface attachments. Two networks are adjacent when some vnode has
/// an addressed interface on both.
#[derive(Debug, Default)]
pub struct RouteResolver;

impl RouteResolver {
    pub fn new() -> Self {
        Self
    }

    /// Whether a path of at most [`MAX_HOPS`] networks connects `src` to
    /// `dst`.
    pub fn reachable(&self, platform: &VPlatform, src: &str, dst: &str) -> bool {
        src == dst || self.first_hop(platform, src, dst).is_some()
    }

    /// The vnode to leave `src` through on the way to `dst`, if any.
    ///
    /// Breadth-first over networks with a visited set and a hop bound, so
    /// topology cycles terminate and the first hop found is on a shortest
    /// path.
    pub fn first_hop(&self, platform: &VPlatform, src: &str, dst: &str) -> Option<String> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(src.to_string());
        // (network, vnode used to leave src, hops so far)
        let mut queue: VecDeque<(String, String, usize)> = VecDeque::new();

        for (net, gateway) in self.neighbors(platform, src) {
            if net == dst {
                return Some(gateway);
            }
            if visited.insert(net.clone()) {
                queue.push_back((net, gateway, 1));
            }
        }
        while let Some((current, origin, hops)) = queue.pop_front() {
            if hops >= MAX_HOPS {
                continue;
            }
            for (net, _) in self.neighbors(platform, &current) {
                if net == dst {
                    return Some(origin);
                }
                if visited.insert(net.clone()) {
                    queue.push_back((net, origin.clone(), hops + 1));
                }
            }
        }
        None
    }

    /// Adjacent networks of `net`, paired with the member vnode providing
    /// the adjacency.
    fn neighbors(&self, platform: &VPlatform, net: &str) -> Vec<(String, String)> {
        let Ok(network) = platform.get_vnetwork(net) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for vnode_name in network.members.keys() {
            let Ok(vnode) = platform.get_vnode(vnode_name) else {
                continue;
            };
            for iface in vnode.vifaces.values() {
                match &iface.vnetwork {
                    Some(other) if other != net && iface.address.is_some() => {
                        out.push((other.clone(), vnode_name.clone()));
                    }
                    _ => {}
                }
            }
        }
        out
    }

    /// Adds a gateway route for every ordered pair of distinct networks
    /// that is reachable but not yet routed. Returns the number of routes
    /// added.
    pub fn complete(&self, platform: &mut VPlatform) -> Result<usize> {
        let names: Vec<String> = platform.vnetworks().map(|n| n.name.clone()).collect();
        let mut additions: Vec<VRoute> = Vec::new();
        for src in &names {
            for dst in &names {
                if src == dst {
                    continue;
                }
                let src_net = platform.get_vnetwork(src)?;
                let dst_net = platform.get_vnetwork(dst)?;
                if src_net.get_route(dst_net.subnet).is_some() {
                    continue;
                }
                let Some(gateway) = self.first_hop(platform, src, dst) else {
                    continue;
                };
                let gw_node = platform.get_vnode(&gateway)?;
                let gw_iface = gw_node
                    .viface_on(src)
                    .and_then(|i| i.address)
                    .ok_or_else(|| Error::NotFound(format!("address of {gateway} on {src}")))?;
                additions.push(VRoute::new(src_net.subnet, dst_net.subnet, gw_iface)?);
            }
        }
        let count = additions.len();
        for route in additions {
            platform.add_vroute(route)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::pnode::{Core, Cpu, Memory, PNode};
    use crate::resources::vnetwork::VNetwork;
    use crate::resources::vnode::{FileSystem, VNode};
    use std::net::IpAddr;

    fn platform() -> VPlatform {
        let mut p = VPlatform::new();
        let cpu =
            Cpu::new((0..4).map(|i| Core::new(i, 2_000_000, vec![2_000_000])).collect());
        p.add_pnode(PNode::new(
            IpAddr::from([192, 168, 0, 1]),
            cpu,
            Memory::default(),
        ))
        .unwrap();
        p
    }

    fn add_vnode(p: &mut VPlatform, name: &str, nets: &[&str]) {
        let fs = FileSystem {
            image: "file:///images/base.tgz".to_string(),
            path: format!("/var/lib/vforge/{name}"),
            shared: false,
        };
        let mut node = VNode::new(name, IpAddr::from([192, 168, 0, 1]), fs);
        let ids: Vec<u32> =
            (0..nets.len()).map(|i| node.add_viface(&format!("if{i}")).unwrap()).collect();
        p.add_vnode(node).unwrap();
        for (id, net) in ids.into_iter().zip(nets) {
            p.attach(name, id, net, None).unwrap();
        }
    }

    /// net1 -- gw1 -- net2 -- gw2 -- net3, plus a leaf on each end.
    fn chain() -> VPlatform {
        let mut p = platform();
        p.add_vnetwork(VNetwork::new("net1", "10.0.1.0/24".parse().unwrap())).unwrap();
        p.add_vnetwork(VNetwork::new("net2", "10.0.2.0/24".parse().unwrap())).unwrap();
        p.add_vnetwork(VNetwork::new("net3", "10.0.3.0/24".parse().unwrap())).unwrap();
        add_vnode(&mut p, "leaf1", &["net1"]);
        add_vnode(&mut p, "gw1", &["net1", "net2"]);
        add_vnode(&mut p, "gw2", &["net2", "net3"]);
        add_vnode(&mut p, "leaf3", &["net3"]);
        p
    }

    #[test]
    fn reachability_over_two_hops() {
        let resolver = RouteResolver::new();
        let p = chain();
        assert!(resolver.reachable(&p, "net1", "net3"));
        assert!(resolver.reachable(&p, "net3", "net1"));
        assert_eq!(resolver.first_hop(&p, "net1", "net3").as_deref(), Some("gw1"));
        assert_eq!(resolver.first_hop(&p, "net3", "net1").as_deref(), Some("gw2"));
    }

    #[test]
    fn isolated_network_is_unreachable() {
        let resolver = RouteResolver::new();
        let mut p = chain();
        p.add_vnetwork(VNetwork::new("lone", "10.0.9.0/24".parse().unwrap())).unwrap();
        assert!(!resolver.reachable(&p, "net1", "lone"));
        assert!(resolver.first_hop(&p, "net1", "lone").is_none());
    }

    #[test]
    fn complete_adds_gateway_routes_for_every_reachable_pair() {
        let resolver = RouteResolver::new();
        let mut p = chain();
        let added = resolver.complete(&mut p).unwrap();
        // 3 networks, every ordered pair reachable
        assert_eq!(added, 6);

        let net1 = p.get_vnetwork("net1").unwrap();
        let net3 = p.get_vnetwork("net3").unwrap();
        let route = net1.get_route(net3.subnet).unwrap();
        let gw1_addr =
            p.get_vnode("gw1").unwrap().viface_on("net1").unwrap().address.unwrap();
        assert_eq!(route.gateway, gw1_addr);

        // idempotent: nothing left to add
        assert_eq!(resolver.complete(&mut p).unwrap(), 0);
    }

    #[test]
    fn cyclic_topologies_terminate() {
        let resolver = RouteResolver::new();
        let mut p = platform();
        p.add_vnetwork(VNetwork::new("a", "10.1.0.0/24".parse().unwrap())).unwrap();
        p.add_vnetwork(VNetwork::new("b", "10.2.0.0/24".parse().unwrap())).unwrap();
        p.add_vnetwork(VNetwork::new("c", "10.3.0.0/24".parse().unwrap())).unwrap();
        add_vnode(&mut p, "gab", &["a", "b"]);
        add_vnode(&mut p, "gbc", &["b", "c"]);
        add_vnode(&mut p, "gca", &["c", "a"]);
        p.add_vnetwork(VNetwork::new("lone", "10.9.0.0/24".parse().unwrap())).unwrap();

        assert!(!resolver.reachable(&p, "a", "lone"));
        assert!(resolver.reachable(&p, "a", "c"));
    }
}
