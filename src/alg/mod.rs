//! Interchangeable enforcement algorithms.
//!
//! CPU throttling ([`Gov`], [`Hogs`]) and network shaping ([`Tbf`]) share
//! the same shape: `apply` begins enforcement on a resource, `undo` stops
//! it. Dispatch is a closed enum, never a name lookup; adding an algorithm
//! means adding a variant. At most one CPU algorithm is active per virtual
//! node, chosen at creation and swappable only through an explicit undo.

use std::path::Path;

use crate::command::Shell;
use crate::node::ifb::IfbAllocator;
use crate::resources::VIface;
use crate::Result;

pub mod gov;
pub mod hogs;
pub mod tbf;

pub use gov::Gov;
pub use hogs::Hogs;
pub use tbf::Tbf;

/// Which CPU throttling algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKind {
    Gov,
    Hogs,
}

/// One physical core to throttle, with its frequency facts resolved out
/// of the resource graph.
#[derive(Debug, Clone)]
pub struct CoreAssignment {
    pub pcore: usize,
    /// Physical frequency in kHz.
    pub pfreq_khz: u64,
    /// Wished virtual frequency in kHz.
    pub vfreq_khz: u64,
    /// Discrete achievable steps, sorted ascending.
    pub steps: Vec<u64>,
}

/// A CPU throttling algorithm instance bound to one virtual node.
#[derive(Debug)]
pub enum CpuAlgorithm {
    Gov(Gov),
    Hogs(Hogs),
}

impl CpuAlgorithm {
    pub fn new(kind: CpuKind) -> Self {
        match kind {
            CpuKind::Gov => Self::Gov(Gov::new()),
            CpuKind::Hogs => Self::Hogs(Hogs::new()),
        }
    }

    pub fn kind(&self) -> CpuKind {
        match self {
            Self::Gov(_) => CpuKind::Gov,
            Self::Hogs(_) => CpuKind::Hogs,
        }
    }

    pub fn apply(&mut self, cores: &[CoreAssignment], cgroup: &Path) -> Result<()> {
        match self {
            Self::Gov(gov) => gov.apply(cores, cgroup),
            Self::Hogs(hogs) => hogs.apply(cores, cgroup),
        }
    }

    pub fn undo(&mut self) {
        match self {
            Self::Gov(gov) => gov.undo(),
            Self::Hogs(hogs) => hogs.undo(),
        }
    }
}

/// A network shaping algorithm instance bound to one virtual interface.
#[derive(Debug)]
pub enum NetAlgorithm {
    Tbf(Tbf),
}

impl NetAlgorithm {
    pub fn new_tbf() -> Self {
        Self::Tbf(Tbf::new())
    }

    pub async fn apply(
        &mut self,
        shell: &dyn Shell,
        ifbs: &IfbAllocator,
        device: &str,
        iface: &VIface,
    ) -> Result<()> {
        match self {
            Self::Tbf(tbf) => tbf.apply(shell, ifbs, device, iface).await,
        }
    }

    pub async fn undo(
        &mut self,
        shell: &dyn Shell,
        ifbs: &IfbAllocator,
        device: &str,
    ) -> Result<()> {
        match self {
            Self::Tbf(tbf) => tbf.undo(shell, ifbs, device).await,
        }
    }
}
