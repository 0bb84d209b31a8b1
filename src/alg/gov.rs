//! Duty-cycle frequency scaling.
//!
//! cpufreq only offers discrete steps, so a wished frequency between two
//! steps is approximated by alternating the cores between the surrounding
//! steps at a computed ratio. When the wish falls below the lowest step,
//! the low phase parks the cores by freezing the node's cgroup instead.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::CoreAssignment;
use crate::Result;

/// Length of one duty cycle.
const PERIOD_MS: u64 = 100;

/// Splits a wished frequency `w` into `(lo, hi, ratio)` over the discrete
/// `steps` (sorted ascending): `hi` is the smallest step ≥ `w`, `lo` the
/// step below it (0 when `hi` is the lowest step, meaning "parked"), and
/// `ratio` the fraction of each cycle spent at `lo`. A wish landing
/// exactly on a step yields `lo = hi = w`, `ratio = 1`.
pub fn duty_cycle(steps: &[u64], wished: u64) -> (u64, u64, f64) {
    if steps.contains(&wished) {
        return (wished, wished, 1.0);
    }
    let hi = match steps.iter().find(|&&s| s >= wished) {
        Some(&hi) => hi,
        // wish above the top step: run flat out
        None => return match steps.last() {
            Some(&top) => (top, top, 1.0),
            None => (wished, wished, 1.0),
        },
    };
    let lo = if hi == steps[0] {
        0
    } else {
        steps[steps.iter().position(|&s| s == hi).unwrap_or(0) - 1]
    };
    let ratio = (wished as f64 - hi as f64) / (lo as f64 - hi as f64);
    (lo, hi, ratio)
}

#[derive(Debug)]
struct Oscillator {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Duty-cycle CPU throttling. One oscillator thread drives every core
/// allocated to the virtual node; the cycle is derived from the first
/// core's wish and applied uniformly.
#[derive(Debug, Default)]
pub struct Gov {
    oscillator: Option<Oscillator>,
}

impl Gov {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, cores: &[CoreAssignment], cgroup: &Path) -> Result<()> {
        if self.oscillator.is_some() {
            return Ok(());
        }
        let Some(first) = cores.first() else {
            return Ok(());
        };
        let (lo, hi, ratio) = duty_cycle(&first.steps, first.vfreq_khz);
        tracing::debug!(lo, hi, ratio, "starting frequency oscillator");

        let cpus: Vec<usize> = cores.iter().map(|c| c.pcore).collect();
        let freezer = cgroup.join("freezer.state");
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("gov-oscillator".to_string())
            .spawn(move || oscillate(&cpus, lo, hi, ratio, &freezer, &thread_stop))?;
        self.oscillator = Some(Oscillator { stop, handle });
        Ok(())
    }

    pub fn undo(&mut self) {
        if let Some(osc) = self.oscillator.take() {
            osc.stop.store(true, Ordering::Relaxed);
            let _ = osc.handle.join();
        }
    }
}

impl Drop for Gov {
    fn drop(&mut self) {
        self.undo();
    }
}

fn oscillate(cpus: &[usize], lo: u64, hi: u64, ratio: f64, freezer: &Path, stop: &AtomicBool) {
    let lo_ms = (PERIOD_MS as f64 * ratio) as u64;
    let hi_ms = PERIOD_MS - lo_ms;
    while !stop.load(Ordering::Relaxed) {
        if hi_ms > 0 {
            set_speed(cpus, hi);
            thread::sleep(Duration::from_millis(hi_ms));
        }
        if stop.load(Ordering::Relaxed) || lo_ms == 0 {
            continue;
        }
        if lo == 0 {
            let _ = std::fs::write(freezer, "FROZEN");
            thread::sleep(Duration::from_millis(lo_ms));
            let _ = std::fs::write(freezer, "THAWED");
        } else {
            set_speed(cpus, lo);
            thread::sleep(Duration::from_millis(lo_ms));
        }
    }
    // leave the cores at full speed and the cgroup thawed
    set_speed(cpus, hi);
    let _ = std::fs::write(freezer, "THAWED");
}

fn set_speed(cpus: &[usize], khz: u64) {
    for cpu in cpus {
        let path = setspeed_path(*cpu);
        if let Err(e) = std::fs::write(&path, khz.to_string()) {
            tracing::trace!(cpu, khz, %e, "scaling_setspeed write failed");
        }
    }
}

fn setspeed_path(cpu: usize) -> PathBuf {
    PathBuf::from(format!("/sys/devices/system/cpu/cpu{cpu}/cpufreq/scaling_setspeed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: &[u64] = &[800_000, 1_200_000, 2_000_000];

    #[test]
    fn exact_step_runs_flat() {
        assert_eq!(duty_cycle(STEPS, 1_200_000), (1_200_000, 1_200_000, 1.0));
        assert_eq!(duty_cycle(STEPS, 800_000), (800_000, 800_000, 1.0));
    }

    #[test]
    fn wish_between_steps_splits_the_cycle() {
        let (lo, hi, ratio) = duty_cycle(STEPS, 1_000_000);
        assert_eq!((lo, hi), (800_000, 1_200_000));
        assert!((ratio - 0.5).abs() < 1e-9);

        let (lo, hi, ratio) = duty_cycle(STEPS, 1_800_000);
        assert_eq!((lo, hi), (1_200_000, 2_000_000));
        assert!((ratio - 0.25).abs() < 1e-9);
        assert!(ratio > 0.0 && ratio < 1.0);
    }

    #[test]
    fn wish_below_lowest_step_parks_the_core() {
        let (lo, hi, ratio) = duty_cycle(STEPS, 600_000);
        assert_eq!((lo, hi), (0, 800_000));
        assert!((ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn wish_above_top_step_runs_flat_out() {
        assert_eq!(duty_cycle(STEPS, 3_000_000), (2_000_000, 2_000_000, 1.0));
    }
}
