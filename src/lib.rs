//! # vforge
//!
//! Turns a declarative description of a virtual distributed platform —
//! virtual nodes, virtual networks, routes, per-interface bandwidth/latency
//! and per-node CPU speed — into concrete enforced operating-system
//! resources: containers, kernel traffic-control hierarchies and CPU
//! duty-cycle/steal throttling, spread across a fleet of physical machines.
//!
//! The crate is organized bottom-up:
//!
//! - [`command`]: the shell-execution primitive everything else issues
//!   enforcement commands through.
//! - [`net`]: IPv4 CIDR arithmetic for the address allocator.
//! - [`resources`]: the platform resource graph (physical nodes, virtual
//!   nodes, networks, routes) and its allocators (addresses, cores).
//! - [`tc`]: builders rendering kernel traffic-control commands with
//!   deterministic, collision-free handles.
//! - [`alg`]: the interchangeable CPU throttling algorithms (Gov, Hogs)
//!   and the TBF network shaping algorithm.
//! - [`node`]: per-physical-node orchestration — container lifecycle,
//!   host bootstrap, the IFB pseudo-device pool.
//!
//! The REST/CLI front end, topology serialization and remote provisioning
//! are deliberately not part of this crate; they drive it through
//! [`resources::VPlatform`] and [`node::Container`].

pub mod alg;
pub mod command;
pub mod error;
pub mod net;
pub mod node;
pub mod resources;
pub mod tc;

pub use error::{Error, Result};
