//! Container definition rendering.
//!
//! Each (re)configure regenerates the definition under a fresh
//! `{vnode}-{generation}` instance name, so an in-flight running instance
//! never has its backing files clobbered mid-use.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::resources::{VNode, VPlatform};
use crate::Result;

use super::iface_device;

/// The rendered artifacts backing one container instance: an LXC-style
/// config and a boot script wiring up addresses and static routes.
#[derive(Debug)]
pub struct ContainerDefinition {
    /// `{vnode}-{generation}`
    pub instance: String,
    pub config: String,
    pub boot_script: String,
}

impl ContainerDefinition {
    pub fn from_vnode(
        platform: &VPlatform,
        vnode: &VNode,
        bridge: &str,
        work_dir: &Path,
        generation: u64,
    ) -> Result<Self> {
        let instance = format!("{}-{generation}", vnode.name);
        let config = render_config(platform, vnode, bridge, work_dir, &instance)?;
        let boot_script = render_boot_script(platform, vnode)?;
        Ok(Self { instance, config, boot_script })
    }

    pub fn config_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.conf", self.instance))
    }

    pub fn boot_script_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}-boot.sh", self.instance))
    }

    /// Writes both artifacts under `work_dir`, returning the config path
    /// the driver consumes.
    pub fn write(&self, work_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(work_dir)?;
        let config_path = self.config_path(work_dir);
        std::fs::write(&config_path, &self.config)?;
        std::fs::write(self.boot_script_path(work_dir), &self.boot_script)?;
        Ok(config_path)
    }
}

fn render_config(
    platform: &VPlatform,
    vnode: &VNode,
    bridge: &str,
    work_dir: &Path,
    instance: &str,
) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "lxc.utsname = {}", vnode.name);
    let _ = writeln!(out, "lxc.rootfs = {}", vnode.filesystem.path);
    let _ = writeln!(out, "lxc.tty = 4");
    let _ = writeln!(out, "lxc.pts = 1024");
    let _ = writeln!(out, "lxc.console = {}", work_dir.join(format!("{instance}.log")).display());
    let _ = writeln!(out, "lxc.mount.entry = proc proc proc nodev,noexec,nosuid 0 0");
    let _ = writeln!(out, "lxc.mount.entry = sysfs sys sysfs defaults 0 0");
    let _ = writeln!(out, "lxc.mount.entry = devpts dev/pts devpts defaults 0 0");

    for iface in vnode.vifaces.values() {
        let (Some(netname), Some(addr)) = (&iface.vnetwork, iface.address) else {
            continue;
        };
        let prefix = platform.get_vnetwork(netname)?.subnet.prefix();
        let _ = writeln!(out, "lxc.network.type = veth");
        let _ = writeln!(out, "lxc.network.link = {bridge}");
        let _ = writeln!(out, "lxc.network.name = {}", iface.name);
        let _ = writeln!(
            out,
            "lxc.network.veth.pair = {}",
            iface_device(&vnode.name, &iface.name, iface.id)
        );
        let _ = writeln!(out, "lxc.network.flags = up");
        let _ = writeln!(out, "lxc.network.ipv4 = {addr}/{prefix}");
        if let Some(hwaddr) = &iface.hwaddr {
            let _ = writeln!(out, "lxc.network.hwaddr = {hwaddr}");
        }
    }

    let cores = platform.get_pnode(vnode.host)?.cpu.allocated_cores(&vnode.name);
    if !cores.is_empty() {
        let list: Vec<String> = cores.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "lxc.cgroup.cpuset.cpus = {}", list.join(","));
    }
    Ok(out)
}

/// Static routes and forwarding, run inside the container at boot. Routes
/// whose gateway is the node's own address are the node's job to forward,
/// not to route through.
fn render_boot_script(platform: &VPlatform, vnode: &VNode) -> Result<String> {
    let mut out = String::from("#!/bin/sh\n");
    let _ = writeln!(out, "hostname {}", vnode.name);
    for iface in vnode.vifaces.values() {
        let (Some(netname), Some(addr)) = (&iface.vnetwork, iface.address) else {
            continue;
        };
        let net = platform.get_vnetwork(netname)?;
        for route in net.routes.values() {
            if route.gateway == addr {
                continue;
            }
            let _ = writeln!(out, "ip route add {} via {} dev {}", route.dst, route.gateway, iface.name);
        }
    }
    if vnode.gateway {
        let _ = writeln!(out, "echo 1 > /proc/sys/net/ipv4/ip_forward");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Ipv4Net;
    use crate::resources::pnode::{Core, Cpu, Memory, PNode};
    use crate::resources::vnetwork::VNetwork;
    use crate::resources::vnode::FileSystem;
    use crate::resources::vroute::VRoute;
    use std::net::IpAddr;

    fn platform_with_node() -> (VPlatform, String) {
        let mut p = VPlatform::new();
        let host = IpAddr::from([192, 168, 0, 1]);
        let cpu =
            Cpu::new((0..4).map(|i| Core::new(i, 2_000_000, vec![2_000_000])).collect());
        p.add_pnode(PNode::new(host, cpu, Memory::default())).unwrap();
        p.add_vnetwork(VNetwork::new("net1", "10.0.0.0/24".parse().unwrap())).unwrap();

        let fs = FileSystem {
            image: "file:///images/base.tgz".to_string(),
            path: "/var/lib/vforge/node1/rootfs".to_string(),
            shared: false,
        };
        let mut node = VNode::new("node1", host, fs);
        let iface = node.add_viface("if0").unwrap();
        p.add_vnode(node).unwrap();
        p.attach("node1", iface, "net1", None).unwrap();
        p.get_pnode_mut(host).unwrap().cpu.alloc_cores("node1", 2).unwrap();
        (p, "node1".to_string())
    }

    #[test]
    fn config_carries_rootfs_veth_address_and_cpuset() {
        let (p, name) = platform_with_node();
        let vnode = p.get_vnode(&name).unwrap();
        let def = ContainerDefinition::from_vnode(&p, vnode, "br0", Path::new("/tmp/vforge"), 1)
            .unwrap();

        assert_eq!(def.instance, "node1-1");
        assert!(def.config.contains("lxc.utsname = node1"));
        assert!(def.config.contains("lxc.rootfs = /var/lib/vforge/node1/rootfs"));
        assert!(def.config.contains("lxc.network.link = br0"));
        assert!(def.config.contains("lxc.network.veth.pair = node1-if0-0"));
        assert!(def.config.contains("lxc.network.ipv4 = 10.0.0.1/24"));
        assert!(def.config.contains("lxc.cgroup.cpuset.cpus = 0,1"));
    }

    #[test]
    fn boot_script_routes_via_foreign_gateways_only() {
        let (mut p, name) = platform_with_node();
        let net1: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let net2: Ipv4Net = "10.0.1.0/24".parse().unwrap();
        // route through someone else
        p.add_vroute(VRoute::new(net1, net2, "10.0.0.254".parse().unwrap()).unwrap()).unwrap();
        p.get_vnode_mut(&name).unwrap().gateway = true;

        let vnode = p.get_vnode(&name).unwrap();
        let def = ContainerDefinition::from_vnode(&p, vnode, "br0", Path::new("/tmp/vforge"), 2)
            .unwrap();
        assert!(def.boot_script.contains("ip route add 10.0.1.0/24 via 10.0.0.254 dev if0"));
        assert!(def.boot_script.contains("echo 1 > /proc/sys/net/ipv4/ip_forward"));
    }

    #[test]
    fn own_gateway_routes_are_skipped() {
        let (mut p, name) = platform_with_node();
        let net1: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        let net2: Ipv4Net = "10.0.1.0/24".parse().unwrap();
        // this node is the gateway itself
        p.add_vroute(VRoute::new(net1, net2, "10.0.0.1".parse().unwrap()).unwrap()).unwrap();

        let vnode = p.get_vnode(&name).unwrap();
        let def = ContainerDefinition::from_vnode(&p, vnode, "br0", Path::new("/tmp/vforge"), 1)
            .unwrap();
        assert!(!def.boot_script.contains("ip route add"));
    }

    #[test]
    fn write_places_both_artifacts_in_the_work_dir() {
        let (p, name) = platform_with_node();
        let vnode = p.get_vnode(&name).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let def =
            ContainerDefinition::from_vnode(&p, vnode, "br0", dir.path(), 3).unwrap();

        let config_path = def.write(dir.path()).unwrap();
        assert_eq!(config_path, dir.path().join("node1-3.conf"));
        let written = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(written, def.config);
        assert!(dir.path().join("node1-3-boot.sh").exists());
    }
}
