//! The ifb pseudo-device pool.
//!
//! The kernel provisions a fixed number of ifb devices at module load
//! (`modprobe ifb numifbs=N`); that inventory is the hard ceiling on
//! concurrently input-shaped interfaces and is discovered once at host
//! bootstrap.

use parking_lot::Mutex;

use crate::command::Shell;
use crate::{Error, Result};

/// Hands out exclusive ifb devices. Reuse order is unspecified.
#[derive(Debug, Default)]
pub struct IfbAllocator {
    pool: Mutex<Vec<String>>,
}

impl IfbAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pool with the ifb devices currently visible to the
    /// kernel. Returns the inventory size.
    pub async fn discover(&self, shell: &dyn Shell) -> Result<usize> {
        let listing = shell.run("ip link list").await?;
        let mut devices = parse_ifb_devices(&listing);
        // pop() hands out the lowest-numbered device first
        devices.sort_unstable_by(|a, b| b.cmp(a));
        let count = devices.len();
        *self.pool.lock() = devices;
        tracing::debug!(count, "discovered ifb devices");
        Ok(count)
    }

    /// Seeds the pool directly, bypassing discovery.
    pub fn seed<I: IntoIterator<Item = String>>(&self, devices: I) {
        let mut pool = self.pool.lock();
        pool.extend(devices);
        pool.sort_unstable_by(|a, b| b.cmp(a));
    }

    pub fn available(&self) -> usize {
        self.pool.lock().len()
    }

    /// Takes one device out of the pool and brings it up. Fails with
    /// [`Error::Unavailable`] once the inventory is exhausted; a failed
    /// `ip link set up` returns the device to the pool.
    pub async fn get_ifb(&self, shell: &dyn Shell) -> Result<String> {
        let device = self
            .pool
            .lock()
            .pop()
            .ok_or_else(|| Error::Unavailable("ifb pool exhausted".to_string()))?;
        match shell.run(&format!("ip link set dev {device} up")).await {
            Ok(_) => Ok(device),
            Err(e) => {
                self.pool.lock().push(device);
                Err(e.into())
            }
        }
    }

    pub fn free_ifb(&self, device: &str) {
        self.pool.lock().push(device.to_string());
    }
}

/// Extracts ifb device names from `ip link list` output, whose device
/// lines look like `3: ifb0: <BROADCAST,NOARP> mtu 32 ...`.
fn parse_ifb_devices(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            parts.next()?.trim().parse::<u32>().ok()?;
            let name = parts.next()?.trim();
            name.starts_with("ifb").then(|| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RecordingShell;

    const IP_LINK_LIST: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DEFAULT
3: ifb0: <BROADCAST,NOARP> mtu 32 qdisc noop state DOWN mode DEFAULT
4: ifb1: <BROADCAST,NOARP> mtu 32 qdisc noop state DOWN mode DEFAULT
";

    #[tokio::test]
    async fn discovery_keeps_only_ifb_devices() {
        let shell = RecordingShell::new();
        shell.reply("ip link list", IP_LINK_LIST);

        let ifbs = IfbAllocator::new();
        assert_eq!(ifbs.discover(shell.as_ref()).await.unwrap(), 2);
        assert_eq!(ifbs.available(), 2);
    }

    #[tokio::test]
    async fn get_brings_the_device_up_and_exhausts() {
        let shell = RecordingShell::new();
        let ifbs = IfbAllocator::new();
        ifbs.seed(["ifb0".to_string(), "ifb1".to_string()]);

        let first = ifbs.get_ifb(shell.as_ref()).await.unwrap();
        assert_eq!(first, "ifb0");
        assert_eq!(shell.commands(), vec!["ip link set dev ifb0 up"]);

        let second = ifbs.get_ifb(shell.as_ref()).await.unwrap();
        assert_eq!(second, "ifb1");
        assert!(matches!(ifbs.get_ifb(shell.as_ref()).await, Err(Error::Unavailable(_))));

        ifbs.free_ifb(&second);
        assert_eq!(ifbs.get_ifb(shell.as_ref()).await.unwrap(), "ifb1");
    }
}
