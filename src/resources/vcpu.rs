//! Virtual CPUs: per-virtual-core frequency wishes over allocated
//! physical cores.

use std::collections::BTreeMap;

use crate::{Error, Result};

use super::pnode::Core;

/// How a virtual core's speed is expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreSpeed {
    /// Absolute frequency in kHz.
    KHz(u64),
    /// Fraction of the underlying physical core's frequency, in (0, 1].
    Ratio(f64),
}

/// A virtual core bound to a physical one.
#[derive(Debug, Clone)]
pub struct VCore {
    pub pcore: usize,
    pub speed: CoreSpeed,
    /// Resolved wished frequency in kHz. Always ≤ the physical core's.
    pub frequency_khz: u64,
}

/// The virtual CPU of a virtual node.
#[derive(Debug, Default)]
pub struct VCpu {
    pub vcores: BTreeMap<usize, VCore>,
}

impl VCpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds virtual core `index` to `pcore` at the wished speed. The
    /// resolved frequency must not exceed the physical core's.
    pub fn attach_vcore(&mut self, index: usize, pcore: &Core, speed: CoreSpeed) -> Result<()> {
        if self.vcores.contains_key(&index) {
            return Err(Error::AlreadyExisting(format!("vcore {index}")));
        }
        let frequency_khz = match speed {
            CoreSpeed::KHz(khz) => khz,
            CoreSpeed::Ratio(r) => {
                if !(0.0..=1.0).contains(&r) || r == 0.0 {
                    return Err(Error::InvalidParameter(format!("core speed ratio {r}")));
                }
                (pcore.frequency_khz as f64 * r) as u64
            }
        };
        if frequency_khz > pcore.frequency_khz {
            return Err(Error::InvalidParameter(format!(
                "wished frequency {frequency_khz}kHz exceeds core {} at {}kHz",
                pcore.physical_id, pcore.frequency_khz
            )));
        }
        self.vcores.insert(index, VCore { pcore: pcore.physical_id, speed, frequency_khz });
        Ok(())
    }

    pub fn detach_vcore(&mut self, index: usize) -> Result<VCore> {
        self.vcores.remove(&index).ok_or_else(|| Error::NotFound(format!("vcore {index}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Core {
        Core::new(0, 2_000_000, vec![800_000, 1_200_000, 2_000_000])
    }

    #[test]
    fn ratio_resolves_against_physical_frequency() {
        let mut vcpu = VCpu::new();
        vcpu.attach_vcore(0, &core(), CoreSpeed::Ratio(0.5)).unwrap();
        assert_eq!(vcpu.vcores[&0].frequency_khz, 1_000_000);
    }

    #[test]
    fn wish_above_physical_is_rejected() {
        let mut vcpu = VCpu::new();
        let err = vcpu.attach_vcore(0, &core(), CoreSpeed::KHz(2_500_000)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let mut vcpu = VCpu::new();
        vcpu.attach_vcore(0, &core(), CoreSpeed::KHz(1_000_000)).unwrap();
        let err = vcpu.attach_vcore(0, &core(), CoreSpeed::KHz(1_000_000)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExisting(_)));

        vcpu.detach_vcore(0).unwrap();
        vcpu.attach_vcore(0, &core(), CoreSpeed::KHz(1_000_000)).unwrap();
    }
}
