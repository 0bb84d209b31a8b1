//! The per-physical-node coordinator: one-shot host bootstrap and the
//! concurrency discipline for container lifecycle operations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

use crate::command::Shell;
use crate::{Error, Result};

use super::ifb::IfbAllocator;
use super::lxc::ContainerDriver;

/// Cap on simultaneous start/stop operations on one host.
pub const MAX_SIMULTANEOUS_ACTIONS: usize = 32;

/// Shared state of one physical node: the shell, the container driver,
/// the ifb pool, and the locks that order lifecycle operations.
pub struct Host {
    pub shell: Arc<dyn Shell>,
    pub driver: Arc<dyn ContainerDriver>,
    pub ifbs: IfbAllocator,
    actions: Semaphore,
    /// Lazily created per-container-name locks; operations against the
    /// same name are totally ordered.
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    bootstrapped: Mutex<bool>,
    work_dir: PathBuf,
    cgroup_root: PathBuf,
    bridge: String,
    max_ifbs: u32,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("work_dir", &self.work_dir)
            .field("cgroup_root", &self.cgroup_root)
            .field("bridge", &self.bridge)
            .field("available_ifbs", &self.ifbs.available())
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(shell: Arc<dyn Shell>, driver: Arc<dyn ContainerDriver>) -> Self {
        Self {
            shell,
            driver,
            ifbs: IfbAllocator::new(),
            actions: Semaphore::new(MAX_SIMULTANEOUS_ACTIONS),
            locks: parking_lot::Mutex::new(HashMap::new()),
            bootstrapped: Mutex::new(false),
            work_dir: PathBuf::from("/var/lib/vforge"),
            cgroup_root: PathBuf::from("/dev/cgroup"),
            bridge: "br0".to_string(),
            max_ifbs: 64,
        }
    }

    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_cgroup_root(mut self, dir: PathBuf) -> Self {
        self.cgroup_root = dir;
        self
    }

    pub fn with_bridge(mut self, bridge: &str) -> Self {
        self.bridge = bridge.to_string();
        self
    }

    pub fn with_max_ifbs(mut self, max_ifbs: u32) -> Self {
        self.max_ifbs = max_ifbs;
        self
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// The cgroup directory scoping one container's helpers.
    pub fn cgroup_for(&self, instance: &str) -> PathBuf {
        self.cgroup_root.join(instance)
    }

    /// One permit per in-flight start/stop, capping host-wide concurrency.
    pub async fn action_permit(&self) -> Result<SemaphorePermit<'_>> {
        self.actions
            .acquire()
            .await
            .map_err(|_| Error::Unavailable("action semaphore closed".to_string()))
    }

    /// The lock handle ordering operations on `name`. Two callers asking
    /// for the same name get the same handle.
    pub fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks.lock().entry(name.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// One-shot host preparation: pty ceiling, cgroup mount, the default
    /// bridge, the ifb module and its device pool. Concurrent callers
    /// serialize on the flag mutex and only the first one does the work.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut done = self.bootstrapped.lock().await;
        if *done {
            return Ok(());
        }
        tracing::info!(bridge = %self.bridge, "bootstrapping host");
        let sh = self.shell.as_ref();

        sh.run_tolerant("sysctl -w kernel.pty.max=8192").await;

        std::fs::create_dir_all(&self.cgroup_root)?;
        // already-mounted and already-created are fine
        sh.run_tolerant(&format!(
            "mount -t cgroup -o cpu,cpuset,freezer cgroup {}",
            self.cgroup_root.display()
        ))
        .await;
        sh.run_tolerant(&format!("brctl addbr {}", self.bridge)).await;
        sh.run(&format!("brctl setfd {} 0", self.bridge)).await?;
        sh.run(&format!("ip link set dev {} up", self.bridge)).await?;

        sh.run_tolerant(&format!("modprobe ifb numifbs={}", self.max_ifbs)).await;
        self.ifbs.discover(sh).await?;

        std::fs::create_dir_all(&self.work_dir)?;
        *done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RecordingShell;
    use crate::node::lxc::Lxc;

    fn host(shell: Arc<RecordingShell>) -> Host {
        let driver = Arc::new(Lxc::new(shell.clone()));
        let dir = tempfile::tempdir().unwrap();
        Host::new(shell, driver)
            .with_work_dir(dir.path().join("work"))
            .with_cgroup_root(dir.path().join("cgroup"))
    }

    #[tokio::test]
    async fn bootstrap_runs_exactly_once() {
        let shell = RecordingShell::new();
        shell.reply("ip link list", "1: ifb0: <BROADCAST,NOARP> mtu 32\n");
        let host = host(shell.clone());

        host.bootstrap().await.unwrap();
        let first_run = shell.commands().len();
        assert!(shell.commands().iter().any(|c| c.starts_with("brctl addbr br0")));
        assert_eq!(host.ifbs.available(), 1);

        host.bootstrap().await.unwrap();
        assert_eq!(shell.commands().len(), first_run);
    }

    #[tokio::test]
    async fn name_locks_are_shared_per_name() {
        let shell = RecordingShell::new();
        let host = host(shell);

        let a = host.name_lock("node1");
        let b = host.name_lock("node1");
        let c = host.name_lock("node2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
