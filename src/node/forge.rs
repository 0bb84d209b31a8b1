//! Forges pair one resource with the algorithm instance enforcing it.

use std::path::PathBuf;

use crate::alg::{CoreAssignment, CpuAlgorithm, CpuKind, NetAlgorithm};
use crate::command::Shell;
use crate::resources::VIface;
use crate::Result;

use super::ifb::IfbAllocator;

/// Drives the CPU algorithm over a virtual node's core allocation.
#[derive(Debug)]
pub struct CpuForge {
    alg: CpuAlgorithm,
    cores: Vec<CoreAssignment>,
    cgroup: PathBuf,
}

impl CpuForge {
    pub fn new(kind: CpuKind, cores: Vec<CoreAssignment>, cgroup: PathBuf) -> Self {
        Self { alg: CpuAlgorithm::new(kind), cores, cgroup }
    }

    pub fn kind(&self) -> CpuKind {
        self.alg.kind()
    }

    pub fn apply(&mut self) -> Result<()> {
        self.alg.apply(&self.cores, &self.cgroup)
    }

    pub fn undo(&mut self) {
        self.alg.undo();
    }
}

/// Drives the shaping algorithm over one virtual interface's host-side
/// device.
#[derive(Debug)]
pub struct NetworkForge {
    pub iface_id: u32,
    device: String,
    alg: NetAlgorithm,
}

impl NetworkForge {
    pub fn new(iface_id: u32, device: String) -> Self {
        Self { iface_id, device, alg: NetAlgorithm::new_tbf() }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub async fn apply(
        &mut self,
        shell: &dyn Shell,
        ifbs: &IfbAllocator,
        iface: &VIface,
    ) -> Result<()> {
        self.alg.apply(shell, ifbs, &self.device, iface).await
    }

    pub async fn undo(&mut self, shell: &dyn Shell, ifbs: &IfbAllocator) -> Result<()> {
        self.alg.undo(shell, ifbs, &self.device).await
    }
}
