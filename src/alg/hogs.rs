//! CPU stealing.
//!
//! A slower core is emulated by pinning a busy-loop thread to it that
//! consumes a fixed fraction of every scheduling period, leaving the
//! complement to the real workload. The hog enrolls itself into the
//! virtual node's cgroup so accounting and freezing see it.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use super::CoreAssignment;
use crate::Result;

/// Length of one steal period.
const PERIOD_US: u64 = 10_000;

/// Fraction of a core to consume so that `vfreq_khz / pfreq_khz` remains
/// for the workload. Zero when the wish meets or exceeds the physical
/// frequency.
pub fn steal_fraction(vfreq_khz: u64, pfreq_khz: u64) -> f64 {
    if pfreq_khz == 0 || vfreq_khz >= pfreq_khz {
        return 0.0;
    }
    1.0 - vfreq_khz as f64 / pfreq_khz as f64
}

#[derive(Debug)]
struct Hog {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Busy-loop CPU throttling, one hog per throttled core.
#[derive(Debug, Default)]
pub struct Hogs {
    hogs: Vec<Hog>,
}

impl Hogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, cores: &[CoreAssignment], cgroup: &Path) -> Result<()> {
        if !self.hogs.is_empty() {
            return Ok(());
        }
        let tasks = cgroup.join("tasks");
        for core in cores {
            let steal = steal_fraction(core.vfreq_khz, core.pfreq_khz);
            if steal == 0.0 {
                continue;
            }
            tracing::debug!(core = core.pcore, steal, "starting cpu hog");
            let stop = Arc::new(AtomicBool::new(false));
            let thread_stop = Arc::clone(&stop);
            let pcore = core.pcore;
            let tasks = tasks.clone();
            let handle = thread::Builder::new()
                .name(format!("hog-{pcore}"))
                .spawn(move || hog(pcore, steal, &tasks, &thread_stop))?;
            self.hogs.push(Hog { stop, handle });
        }
        Ok(())
    }

    pub fn undo(&mut self) {
        for hog in self.hogs.drain(..) {
            hog.stop.store(true, Ordering::Relaxed);
            let _ = hog.handle.join();
        }
    }
}

impl Drop for Hogs {
    fn drop(&mut self) {
        self.undo();
    }
}

fn hog(core: usize, steal: f64, tasks: &Path, stop: &AtomicBool) {
    let mut set = CpuSet::new();
    if set.set(core).is_ok() {
        let _ = sched_setaffinity(Pid::from_raw(0), &set);
    }
    enroll(tasks);

    let busy = Duration::from_micros((PERIOD_US as f64 * steal) as u64);
    let idle = Duration::from_micros(PERIOD_US).saturating_sub(busy);
    while !stop.load(Ordering::Relaxed) {
        let start = Instant::now();
        while start.elapsed() < busy {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            std::hint::spin_loop();
        }
        if !idle.is_zero() {
            thread::sleep(idle);
        }
    }
}

fn enroll(tasks: &Path) {
    let tid = nix::unistd::gettid();
    let written = std::fs::OpenOptions::new()
        .append(true)
        .open(tasks)
        .and_then(|mut f| writeln!(f, "{tid}"));
    if let Err(e) = written {
        tracing::trace!(?tasks, %e, "cgroup enrollment failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steal_is_the_complement_of_the_speed_ratio() {
        assert!((steal_fraction(1_000_000, 2_000_000) - 0.5).abs() < 1e-9);
        assert!((steal_fraction(500_000, 2_000_000) - 0.75).abs() < 1e-9);
        let s = steal_fraction(1, 2_000_000);
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn wish_at_or_above_physical_steals_nothing() {
        assert_eq!(steal_fraction(2_000_000, 2_000_000), 0.0);
        assert_eq!(steal_fraction(3_000_000, 2_000_000), 0.0);
    }

    #[test]
    fn no_hog_is_spawned_for_unthrottled_cores() {
        let mut hogs = Hogs::new();
        let cores = vec![CoreAssignment {
            pcore: 0,
            pfreq_khz: 2_000_000,
            vfreq_khz: 2_000_000,
            steps: vec![2_000_000],
        }];
        hogs.apply(&cores, Path::new("/nonexistent-cgroup")).unwrap();
        assert!(hogs.hogs.is_empty());
        hogs.undo();
    }
}
