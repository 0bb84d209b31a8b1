//! Physical nodes and their core allocator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;

use crate::alg::CpuKind;
use crate::{Error, Result};

use super::Status;

/// Memory capacity of a physical node, informational only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Memory {
    pub capacity_mb: u64,
    pub swap_mb: u64,
}

/// A physical CPU core.
#[derive(Debug, Clone)]
pub struct Core {
    pub physical_id: usize,
    /// Nominal clock frequency in kHz.
    pub frequency_khz: u64,
    /// Discrete achievable frequency steps, sorted ascending.
    pub frequencies: Vec<u64>,
    /// Peer cores sharing a cache domain with this one.
    pub cache_links: HashSet<usize>,
}

impl Core {
    pub fn new(physical_id: usize, frequency_khz: u64, mut frequencies: Vec<u64>) -> Self {
        frequencies.sort_unstable();
        Self { physical_id, frequency_khz, frequencies, cache_links: HashSet::new() }
    }
}

/// The CPU of a physical node: its cores and their exclusive allocation
/// to virtual nodes.
#[derive(Debug, Default)]
pub struct Cpu {
    cores: BTreeMap<usize, Core>,
    /// core id -> owning virtual node name
    allocations: HashMap<usize, String>,
}

impl Cpu {
    pub fn new(cores: Vec<Core>) -> Self {
        Self {
            cores: cores.into_iter().map(|c| (c.physical_id, c)).collect(),
            allocations: HashMap::new(),
        }
    }

    pub fn core(&self, id: usize) -> Option<&Core> {
        self.cores.get(&id)
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub fn free_count(&self) -> usize {
        self.cores.len() - self.allocations.len()
    }

    /// Records every core of `coreset` as a cache-link peer of every other
    /// member. The relation is symmetric.
    pub fn add_critical_cache_link(&mut self, coreset: &[usize]) {
        for &id in coreset {
            if let Some(core) = self.cores.get_mut(&id) {
                core.cache_links.extend(coreset.iter().copied().filter(|&peer| peer != id));
            }
        }
    }

    /// First-fit allocation of `n` free cores to `vnode`. Placement policy
    /// beyond first-fit (cache awareness) is the CPU algorithm's concern.
    pub fn alloc_cores(&mut self, vnode: &str, n: usize) -> Result<Vec<usize>> {
        let free: Vec<usize> = self
            .cores
            .keys()
            .filter(|id| !self.allocations.contains_key(id))
            .take(n)
            .copied()
            .collect();
        if free.len() < n {
            return Err(Error::Unavailable(format!(
                "requested {n} cores, {} free",
                self.free_count()
            )));
        }
        for &id in &free {
            self.allocations.insert(id, vnode.to_string());
        }
        Ok(free)
    }

    /// Releases every core currently mapped to `vnode`.
    pub fn free_cores(&mut self, vnode: &str) {
        self.allocations.retain(|_, owner| owner != vnode);
    }

    pub fn allocated_cores(&self, vnode: &str) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .allocations
            .iter()
            .filter(|(_, owner)| owner.as_str() == vnode)
            .map(|(&id, _)| id)
            .collect();
        out.sort_unstable();
        out
    }
}

/// A real machine hosting virtual nodes. Unique by address.
#[derive(Debug)]
pub struct PNode {
    pub address: IpAddr,
    pub status: Status,
    pub cpu: Cpu,
    pub memory: Memory,
    /// Default CPU throttling algorithm for virtual nodes hosted here.
    pub cpu_algorithm: CpuKind,
}

impl PNode {
    pub fn new(address: IpAddr, cpu: Cpu, memory: Memory) -> Self {
        Self { address, status: Status::Unconfigured, cpu, memory, cpu_algorithm: CpuKind::Hogs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eight_core_cpu() -> Cpu {
        Cpu::new((0..8).map(|i| Core::new(i, 2_000_000, vec![1_000_000, 2_000_000])).collect())
    }

    #[test]
    fn alloc_is_exclusive_and_first_fit() {
        let mut cpu = eight_core_cpu();
        let a = cpu.alloc_cores("a", 3).unwrap();
        assert_eq!(a, vec![0, 1, 2]);
        let b = cpu.alloc_cores("b", 3).unwrap();
        assert_eq!(b, vec![3, 4, 5]);
        assert!(a.iter().all(|id| !b.contains(id)));
    }

    #[test]
    fn exhaustion_fails_and_free_reopens() {
        let mut cpu = eight_core_cpu();
        cpu.alloc_cores("a", 8).unwrap();
        assert!(matches!(cpu.alloc_cores("b", 1), Err(Error::Unavailable(_))));

        cpu.free_cores("a");
        assert_eq!(cpu.free_count(), 8);
        cpu.alloc_cores("b", 1).unwrap();
        assert_eq!(cpu.allocated_cores("b"), vec![0]);
    }

    #[test]
    fn nine_of_eight_fails_then_one_free_allows_one_more() {
        let mut cpu = eight_core_cpu();
        for i in 0..8 {
            cpu.alloc_cores(&format!("vn{i}"), 1).unwrap();
        }
        assert!(matches!(cpu.alloc_cores("vn8", 1), Err(Error::Unavailable(_))));

        cpu.free_cores("vn3");
        assert_eq!(cpu.alloc_cores("vn8", 1).unwrap(), vec![3]);
        assert!(matches!(cpu.alloc_cores("vn9", 1), Err(Error::Unavailable(_))));
    }

    #[test]
    fn cache_links_are_symmetric() {
        let mut cpu = eight_core_cpu();
        cpu.add_critical_cache_link(&[0, 1, 4]);
        assert!(cpu.core(0).unwrap().cache_links.contains(&1));
        assert!(cpu.core(0).unwrap().cache_links.contains(&4));
        assert!(cpu.core(1).unwrap().cache_links.contains(&0));
        assert!(cpu.core(4).unwrap().cache_links.contains(&1));
        assert!(!cpu.core(2).unwrap().cache_links.contains(&0));
    }
}
