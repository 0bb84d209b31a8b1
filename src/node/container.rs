//! The lifecycle state machine of one virtual node's container.
//!
//! `Unconfigured → Configured → Running ⇄ Stopped`. Configuration is
//! regenerated on every call so changed resource specs take effect;
//! start applies the CPU and network algorithms once the container
//! reports Running; stop undoes them before stopping the container.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::alg::CoreAssignment;
use crate::resources::{Status, VIface, VPlatform};
use crate::{Error, Result};

use super::definition::ContainerDefinition;
use super::forge::{CpuForge, NetworkForge};
use super::iface_device;
use super::lxc::{MAX_WAIT_CYCLES, POLL_INTERVAL};
use super::Host;

/// Orchestrates one named virtual node on its host.
#[derive(Debug)]
pub struct Container {
    host: Arc<Host>,
    name: String,
    /// Bumped on every configure; names the current instance.
    generation: u64,
    cpuforge: Option<CpuForge>,
    netforges: HashMap<u32, NetworkForge>,
}

impl Container {
    pub fn new(host: Arc<Host>, name: &str) -> Self {
        Self {
            host,
            name: name.to_string(),
            generation: 0,
            cpuforge: None,
            netforges: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The driver-visible name of the current instance.
    pub fn instance(&self) -> String {
        format!("{}-{}", self.name, self.generation)
    }

    /// Regenerates the container definition under a fresh instance name
    /// and rebuilds the forge set from the vnode's current resources. Any
    /// previous instance is stopped and destroyed first, so a reconfigure
    /// never leaves the old container running under its old name.
    pub async fn configure(&mut self, platform: &mut VPlatform) -> Result<()> {
        let host = Arc::clone(&self.host);
        host.bootstrap().await?;
        let lock = host.name_lock(&self.name);
        let _ordered = lock.lock().await;

        if self.generation > 0 {
            let previous = self.instance();
            if platform.get_vnode(&self.name)?.status == Status::Running {
                self.undo_forges().await?;
                host.driver.stop(&previous).await?;
                host.driver.wait(&previous, Status::Stopped).await?;
            }
            host.driver.destroy(&previous).await?;
        }

        platform.get_vnode_mut(&self.name)?.status = Status::Configuring;
        self.generation += 1;

        let vnode = platform.get_vnode(&self.name)?;
        let definition = ContainerDefinition::from_vnode(
            platform,
            vnode,
            host.bridge(),
            host.work_dir(),
            self.generation,
        )?;
        let config = definition.write(host.work_dir())?;
        host.driver.create(&definition.instance, &config).await?;

        self.cpuforge = build_cpuforge(&host, platform, &self.name, &self.instance())?;
        self.netforges = build_netforges(platform, &self.name)?;

        platform.get_vnode_mut(&self.name)?.status = Status::Configured;
        tracing::info!(name = %self.name, instance = %definition.instance, "configured");
        Ok(())
    }

    /// Starts the instance, waits for Running, then turns enforcement on:
    /// CPU algorithm, every interface's shaping, segmentation offload off.
    pub async fn start(&mut self, platform: &mut VPlatform) -> Result<()> {
        let host = Arc::clone(&self.host);
        let _permit = host.action_permit().await?;
        let lock = host.name_lock(&self.name);
        let _ordered = lock.lock().await;

        let status = platform.get_vnode(&self.name)?.status;
        if !matches!(status, Status::Configured | Status::Stopped) {
            return Err(Error::InvalidParameter(format!(
                "cannot start {} from {status}",
                self.name
            )));
        }

        let instance = self.instance();
        host.driver.start(&instance).await?;
        host.driver.wait(&instance, Status::Running).await?;

        if let Some(forge) = &mut self.cpuforge {
            forge.apply()?;
        }
        for forge in self.netforges.values_mut() {
            let iface = iface_of(platform, &self.name, forge.iface_id)?;
            forge.apply(host.shell.as_ref(), &host.ifbs, &iface).await?;
            // shaping misbehaves with offload enabled
            host.shell.run_tolerant(&format!("ethtool -K {} gso off", forge.device())).await;
            host.shell.run_tolerant(&format!("ethtool -K {} tso off", forge.device())).await;
        }

        platform.get_vnode_mut(&self.name)?.status = Status::Running;
        tracing::info!(name = %self.name, %instance, "started");
        Ok(())
    }

    /// Turns enforcement off, then stops the instance.
    pub async fn stop(&mut self, platform: &mut VPlatform) -> Result<()> {
        let host = Arc::clone(&self.host);
        let _permit = host.action_permit().await?;
        let lock = host.name_lock(&self.name);
        let _ordered = lock.lock().await;

        self.undo_forges().await?;

        let instance = self.instance();
        host.driver.stop(&instance).await?;
        host.driver.wait(&instance, Status::Stopped).await?;

        platform.get_vnode_mut(&self.name)?.status = Status::Stopped;
        tracing::info!(name = %self.name, %instance, "stopped");
        Ok(())
    }

    /// Reconciles the per-interface forges against the vnode's current
    /// interface set, then reapplies enforcement when running. Lets the
    /// topology evolve on a live node without a full teardown.
    pub async fn update(&mut self, platform: &VPlatform) -> Result<()> {
        let host = Arc::clone(&self.host);
        let lock = host.name_lock(&self.name);
        let _ordered = lock.lock().await;

        let vnode = platform.get_vnode(&self.name)?;
        let attached: HashSet<u32> = vnode
            .vifaces
            .values()
            .filter(|i| i.vnetwork.is_some() && i.address.is_some())
            .map(|i| i.id)
            .collect();
        let running = vnode.status == Status::Running;

        let stale: Vec<u32> =
            self.netforges.keys().filter(|id| !attached.contains(*id)).copied().collect();
        for id in stale {
            if let Some(mut forge) = self.netforges.remove(&id) {
                forge.undo(host.shell.as_ref(), &host.ifbs).await?;
            }
        }
        for &id in &attached {
            if !self.netforges.contains_key(&id) {
                let iface = iface_of(platform, &self.name, id)?;
                let device = iface_device(&self.name, &iface.name, id);
                self.netforges.insert(id, NetworkForge::new(id, device));
            }
        }

        if running {
            for forge in self.netforges.values_mut() {
                let iface = iface_of(platform, &self.name, forge.iface_id)?;
                forge.undo(host.shell.as_ref(), &host.ifbs).await?;
                forge.apply(host.shell.as_ref(), &host.ifbs, &iface).await?;
            }
        }
        Ok(())
    }

    /// Stops if needed, destroys the instance and waits (bounded) for the
    /// driver to stop listing it.
    pub async fn destroy(&mut self, platform: &mut VPlatform) -> Result<()> {
        let host = Arc::clone(&self.host);
        let _permit = host.action_permit().await?;
        let lock = host.name_lock(&self.name);
        let _ordered = lock.lock().await;

        let instance = self.instance();
        if platform.get_vnode(&self.name)?.status == Status::Running {
            self.undo_forges().await?;
            host.driver.stop(&instance).await?;
            host.driver.wait(&instance, Status::Stopped).await?;
        }
        host.driver.destroy(&instance).await?;

        let mut gone = false;
        for cycle in 0..MAX_WAIT_CYCLES {
            if cycle > 0 {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            if !host.driver.list().await?.iter().any(|n| n == &instance) {
                gone = true;
                break;
            }
        }
        if !gone {
            return Err(Error::WaitTimeout { name: instance, status: Status::Unconfigured });
        }

        self.cpuforge = None;
        self.netforges.clear();
        platform.get_vnode_mut(&self.name)?.status = Status::Unconfigured;
        tracing::info!(name = %self.name, "destroyed");
        Ok(())
    }

    async fn undo_forges(&mut self) -> Result<()> {
        if let Some(forge) = &mut self.cpuforge {
            forge.undo();
        }
        let host = Arc::clone(&self.host);
        for forge in self.netforges.values_mut() {
            forge.undo(host.shell.as_ref(), &host.ifbs).await?;
        }
        Ok(())
    }
}

fn build_cpuforge(
    host: &Host,
    platform: &VPlatform,
    name: &str,
    instance: &str,
) -> Result<Option<CpuForge>> {
    let vnode = platform.get_vnode(name)?;
    let Some(vcpu) = &vnode.vcpu else {
        return Ok(None);
    };
    let pnode = platform.get_pnode(vnode.host)?;
    let mut cores = Vec::with_capacity(vcpu.vcores.len());
    for vcore in vcpu.vcores.values() {
        let pcore = pnode
            .cpu
            .core(vcore.pcore)
            .ok_or_else(|| Error::NotFound(format!("core {} on {}", vcore.pcore, vnode.host)))?;
        cores.push(CoreAssignment {
            pcore: pcore.physical_id,
            pfreq_khz: pcore.frequency_khz,
            vfreq_khz: vcore.frequency_khz,
            steps: pcore.frequencies.clone(),
        });
    }
    Ok(Some(CpuForge::new(pnode.cpu_algorithm, cores, host.cgroup_for(instance))))
}

fn build_netforges(platform: &VPlatform, name: &str) -> Result<HashMap<u32, NetworkForge>> {
    let vnode = platform.get_vnode(name)?;
    let mut forges = HashMap::new();
    for iface in vnode.vifaces.values() {
        if iface.vnetwork.is_none() || iface.address.is_none() {
            continue;
        }
        let device = iface_device(name, &iface.name, iface.id);
        forges.insert(iface.id, NetworkForge::new(iface.id, device));
    }
    Ok(forges)
}

fn iface_of(platform: &VPlatform, vnode: &str, id: u32) -> Result<VIface> {
    platform
        .get_vnode(vnode)?
        .vifaces
        .get(&id)
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("viface id {id} on {vnode}")))
}
