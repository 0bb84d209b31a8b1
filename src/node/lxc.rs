//! The container lifecycle tool.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::Shell;
use crate::resources::Status;
use crate::{Error, Result};

/// How many status polls a blocking wait performs before giving up.
pub const MAX_WAIT_CYCLES: u32 = 16;

/// Delay between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The external container lifecycle tool. Everything the orchestration
/// layer needs from it: create/start/stop/destroy/list by name, plus a
/// bounded wait for a target status.
#[async_trait]
pub trait ContainerDriver: Send + Sync + std::fmt::Debug {
    async fn create(&self, name: &str, config: &Path) -> Result<()>;
    async fn start(&self, name: &str) -> Result<()>;
    async fn stop(&self, name: &str) -> Result<()>;
    async fn destroy(&self, name: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;

    /// Polls until the container reports `status`, failing with
    /// [`Error::WaitTimeout`] after [`MAX_WAIT_CYCLES`] polls.
    async fn wait(&self, name: &str, status: Status) -> Result<()>;
}

/// Shell-backed LXC implementation of the driver.
#[derive(Debug)]
pub struct Lxc {
    shell: Arc<dyn Shell>,
}

impl Lxc {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }

    async fn state(&self, name: &str) -> Result<Option<Status>> {
        let out = self.shell.run(&format!("lxc-info -n {name} -s")).await?;
        Ok(parse_state(&out))
    }
}

#[async_trait]
impl ContainerDriver for Lxc {
    async fn create(&self, name: &str, config: &Path) -> Result<()> {
        self.shell.run(&format!("lxc-create -n {name} -f {}", config.display())).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.shell.run(&format!("lxc-start -d -n {name}")).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.shell.run(&format!("lxc-stop -n {name}")).await?;
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        self.shell.run(&format!("lxc-destroy -n {name}")).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let out = self.shell.run("lxc-ls").await?;
        // running containers are listed twice
        let names: BTreeSet<String> = out.split_whitespace().map(str::to_string).collect();
        Ok(names.into_iter().collect())
    }

    async fn wait(&self, name: &str, status: Status) -> Result<()> {
        for cycle in 0..MAX_WAIT_CYCLES {
            if cycle > 0 {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            if self.state(name).await? == Some(status) {
                return Ok(());
            }
        }
        Err(Error::WaitTimeout { name: name.to_string(), status })
    }
}

fn parse_state(out: &str) -> Option<Status> {
    let state = out.lines().find_map(|l| l.trim().strip_prefix("State:"))?.trim();
    match state {
        "RUNNING" => Some(Status::Running),
        "STOPPED" => Some(Status::Stopped),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RecordingShell;

    #[tokio::test]
    async fn wait_returns_once_the_state_matches() {
        let shell = RecordingShell::new();
        shell.reply("lxc-info", "State:          RUNNING\n");

        let lxc = Lxc::new(shell.clone());
        lxc.wait("node1-1", Status::Running).await.unwrap();
        assert_eq!(shell.commands(), vec!["lxc-info -n node1-1 -s"]);
    }

    #[tokio::test]
    async fn list_deduplicates_running_containers() {
        let shell = RecordingShell::new();
        shell.reply("lxc-ls", "node1-1 node2-1\nnode1-1\n");

        let lxc = Lxc::new(shell.clone());
        assert_eq!(lxc.list().await.unwrap(), vec!["node1-1", "node2-1"]);
    }

    #[test]
    fn unknown_states_are_ignored() {
        assert_eq!(parse_state("State:          STARTING\n"), None);
        assert_eq!(parse_state("State:          STOPPED\n"), Some(Status::Stopped));
        assert_eq!(parse_state("garbage"), None);
    }
}
