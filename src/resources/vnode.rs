//! Virtual nodes and their interfaces.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::{Error, Result};

use super::vcpu::VCpu;
use super::Status;

/// Traffic direction on a virtual interface.
///
/// Parsing is strict: `"INPUT"` and `"OUTPUT"` only, case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        })
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INPUT" => Ok(Self::Input),
            "OUTPUT" => Ok(Self::Output),
            other => Err(Error::InvalidParameter(format!("traffic direction {other:?}"))),
        }
    }
}

/// A rate cap, as a tc rate string such as `"10mbit"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    pub rate: String,
}

/// An added one-way delay in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    pub delay_ms: u64,
}

/// Shaping properties for one direction of an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VTraffic {
    pub bandwidth: Option<Bandwidth>,
    pub latency: Option<Latency>,
}

impl VTraffic {
    /// Whether this spec asks for any shaping at all.
    pub fn limited(&self) -> bool {
        self.bandwidth.is_some() || self.latency.is_some()
    }
}

/// A network endpoint on a virtual node. At most one network attachment.
#[derive(Debug, Clone)]
pub struct VIface {
    pub id: u32,
    pub name: String,
    pub address: Option<Ipv4Addr>,
    /// Name of the attached virtual network, if any.
    pub vnetwork: Option<String>,
    pub input: Option<VTraffic>,
    pub output: Option<VTraffic>,
    pub hwaddr: Option<String>,
}

impl VIface {
    fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: None,
            vnetwork: None,
            input: None,
            output: None,
            hwaddr: None,
        }
    }

    pub fn traffic(&self, direction: Direction) -> Option<&VTraffic> {
        match direction {
            Direction::Input => self.input.as_ref(),
            Direction::Output => self.output.as_ref(),
        }
    }

    pub fn set_traffic(&mut self, direction: Direction, traffic: VTraffic) {
        match direction {
            Direction::Input => self.input = Some(traffic),
            Direction::Output => self.output = Some(traffic),
        }
    }
}

/// The filesystem backing a virtual node. Image download and extraction
/// happen elsewhere; this is the reference the container definition uses.
#[derive(Debug, Clone)]
pub struct FileSystem {
    pub image: String,
    pub path: String,
    pub shared: bool,
}

/// A container-backed emulated host.
#[derive(Debug)]
pub struct VNode {
    pub name: String,
    /// Address of the hosting physical node.
    pub host: IpAddr,
    pub filesystem: FileSystem,
    pub vifaces: BTreeMap<u32, VIface>,
    pub vcpu: Option<VCpu>,
    /// Gateway nodes get IP forwarding enabled at boot.
    pub gateway: bool,
    pub status: Status,
    next_iface_id: u32,
}

impl VNode {
    pub fn new(name: &str, host: IpAddr, filesystem: FileSystem) -> Self {
        Self {
            name: name.to_string(),
            host,
            filesystem,
            vifaces: BTreeMap::new(),
            vcpu: None,
            gateway: false,
            status: Status::Unconfigured,
            next_iface_id: 0,
        }
    }

    /// Adds an interface with a node-unique name, returning its id.
    pub fn add_viface(&mut self, name: &str) -> Result<u32> {
        if self.vifaces.values().any(|i| i.name == name) {
            return Err(Error::AlreadyExisting(format!("viface {name} on {}", self.name)));
        }
        let id = self.next_iface_id;
        self.next_iface_id += 1;
        self.vifaces.insert(id, VIface::new(id, name));
        Ok(id)
    }

    pub fn remove_viface(&mut self, id: u32) -> Result<VIface> {
        self.vifaces.remove(&id).ok_or_else(|| Error::NotFound(format!("viface id {id}")))
    }

    pub fn get_viface_by_name(&self, name: &str) -> Option<&VIface> {
        self.vifaces.values().find(|i| i.name == name)
    }

    pub fn get_viface_by_name_mut(&mut self, name: &str) -> Option<&mut VIface> {
        self.vifaces.values_mut().find(|i| i.name == name)
    }

    /// The interface attached to the named network, if any.
    pub fn viface_on(&self, vnetwork: &str) -> Option<&VIface> {
        self.vifaces.values().find(|i| i.vnetwork.as_deref() == Some(vnetwork))
    }
}
