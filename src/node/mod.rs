//! Per-physical-node orchestration: host bootstrap, the ifb pool, the
//! container driver and the forge composition driving a virtual node's
//! lifecycle.

pub mod admin;
pub mod container;
pub mod definition;
pub mod forge;
pub mod ifb;
pub mod lxc;

pub use admin::Host;
pub use container::Container;
pub use definition::ContainerDefinition;
pub use forge::{CpuForge, NetworkForge};
pub use ifb::IfbAllocator;
pub use lxc::{ContainerDriver, Lxc};

/// Linux caps interface names at 15 characters.
pub const IFNAME_MAX: usize = 15;

/// Host-side veth device name for a vnode interface:
/// `{vnode}-{iface}-{id}`, keeping the tail when the kernel limit is
/// exceeded so the discriminating id survives truncation.
pub fn iface_device(vnode: &str, iface: &str, id: u32) -> String {
    let full = format!("{vnode}-{iface}-{id}");
    let skip = full.chars().count().saturating_sub(IFNAME_MAX);
    full.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pass_through() {
        assert_eq!(iface_device("a", "if0", 0), "a-if0-0");
    }

    #[test]
    fn long_names_keep_the_tail() {
        let device = iface_device("a-very-long-vnode-name", "if0", 7);
        assert_eq!(device.chars().count(), IFNAME_MAX);
        assert!(device.ends_with("-if0-7"));
    }
}
