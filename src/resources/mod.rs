//! The platform resource graph: physical nodes, virtual nodes, virtual
//! networks and routes, plus the allocators handing out scarce physical
//! resources (addresses, cores).
//!
//! Structural mutation of the graph is single-writer; concurrent callers
//! serialize at the boundary.

use std::fmt;

pub mod platform;
pub mod pnode;
pub mod topo;
pub mod vcpu;
pub mod vnetwork;
pub mod vnode;
pub mod vroute;

pub use platform::VPlatform;
pub use pnode::{Core, Cpu, Memory, PNode};
pub use topo::RouteResolver;
pub use vcpu::{CoreSpeed, VCore, VCpu};
pub use vnetwork::{AddressPool, VNetwork};
pub use vnode::{Bandwidth, Direction, FileSystem, Latency, VIface, VNode, VTraffic};
pub use vroute::VRoute;

/// Lifecycle status of a node (physical or virtual).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Unconfigured,
    Configuring,
    Configured,
    Running,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unconfigured => "UNCONFIGURED",
            Self::Configuring => "CONFIGURING",
            Self::Configured => "CONFIGURED",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}
