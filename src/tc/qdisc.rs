//! Queueing-discipline command builders.

use std::fmt;

use super::handle::TcId;

/// The root attachment point of a device. It issues no add command of its
/// own — the first shaping stage installs itself as the root — but
/// deleting it tears down the whole subtree per kernel semantics.
#[derive(Debug)]
pub struct QdiscRoot {
    device: String,
}

impl QdiscRoot {
    pub fn new(device: &str) -> Self {
        Self { device: device.to_string() }
    }

    pub fn del(&self) -> String {
        format!("tc qdisc del dev {} root", self.device)
    }
}

/// The ingress queueing discipline, fixed at handle `ffff:` by the kernel.
#[derive(Debug)]
pub struct QdiscIngress {
    device: String,
}

impl QdiscIngress {
    pub const HANDLE: &'static str = "ffff:";

    pub fn new(device: &str) -> Self {
        Self { device: device.to_string() }
    }

    pub fn add(&self) -> String {
        format!("tc qdisc add dev {} ingress", self.device)
    }

    pub fn del(&self) -> String {
        format!("tc qdisc del dev {} ingress", self.device)
    }
}

/// Type-specific parameters of a shaping stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QdiscKind {
    /// Token-bucket filter. `buffer` in bytes and `latency` are the
    /// queue's burst allowance and maximum packet wait.
    Tbf { rate: String, buffer: u32, latency: String },
    /// Network emulation, delay only.
    Netem { delay_ms: u64 },
}

impl QdiscKind {
    /// A token-bucket filter with the stock buffer/latency pairing.
    pub fn tbf(rate: &str) -> Self {
        Self::Tbf { rate: rate.to_string(), buffer: 1800, latency: "50ms".to_string() }
    }

    pub fn netem(delay_ms: u64) -> Self {
        Self::Netem { delay_ms }
    }
}

impl fmt::Display for QdiscKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tbf { rate, buffer, latency } => {
                write!(f, "tbf rate {rate} buffer {buffer} latency {latency}")
            }
            Self::Netem { delay_ms } => write!(f, "netem delay {delay_ms}ms"),
        }
    }
}

/// One shaping stage: a classful qdisc with a handle, an optional parent
/// reference (none means the device root) and its parameters.
#[derive(Debug)]
pub struct Qdisc {
    device: String,
    parent: Option<TcId>,
    handle: TcId,
    kind: QdiscKind,
}

impl Qdisc {
    /// A stage attached directly under the device root.
    pub fn root_child(device: &str, major: u16, kind: QdiscKind) -> Self {
        Self { device: device.to_string(), parent: None, handle: TcId::new(major), kind }
    }

    /// A stage attached under `parent`, which hands out the reference.
    pub fn child(device: &str, parent: TcId, major: u16, kind: QdiscKind) -> Self {
        Self { device: device.to_string(), parent: Some(parent), handle: TcId::new(major), kind }
    }

    pub fn handle(&self) -> &TcId {
        &self.handle
    }

    /// Derives a reference for attaching a further stage under this one.
    pub fn child_ref(&mut self) -> TcId {
        self.handle.child_ref()
    }

    pub fn add(&self) -> String {
        match &self.parent {
            None => {
                format!("tc qdisc add dev {} root handle {} {}", self.device, self.handle, self.kind)
            }
            Some(parent) => format!(
                "tc qdisc add dev {} parent {parent} handle {} {}",
                self.device, self.handle, self.kind
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_only_renders_a_delete() {
        let root = QdiscRoot::new("if0");
        assert_eq!(root.del(), "tc qdisc del dev if0 root");
    }

    #[test]
    fn ingress_add_and_del() {
        let ingress = QdiscIngress::new("eth2");
        assert_eq!(ingress.add(), "tc qdisc add dev eth2 ingress");
        assert_eq!(ingress.del(), "tc qdisc del dev eth2 ingress");
    }

    #[test]
    fn tbf_under_root_renders_stock_parameters() {
        let tbf = Qdisc::root_child("if0", 1, QdiscKind::tbf("10mbit"));
        assert_eq!(
            tbf.add(),
            "tc qdisc add dev if0 root handle 1: tbf rate 10mbit buffer 1800 latency 50ms"
        );
    }

    #[test]
    fn netem_nests_under_the_tbf() {
        let mut tbf = Qdisc::root_child("if0", 1, QdiscKind::tbf("10mbit"));
        let netem = Qdisc::child("if0", tbf.child_ref(), 10, QdiscKind::netem(10));
        assert_eq!(netem.add(), "tc qdisc add dev if0 parent 1:0x1 handle 10: netem delay 10ms");
    }
}
