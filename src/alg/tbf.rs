//! Token-bucket network shaping over a virtual interface.

use crate::command::Shell;
use crate::node::ifb::IfbAllocator;
use crate::resources::{VIface, VTraffic};
use crate::tc::{FilterU32, MajorSeq, Qdisc, QdiscIngress, QdiscKind, QdiscRoot, TcId};
use crate::Result;

/// Builds and tears down the shaping tree of one interface: a TBF/netem
/// chain on the real device for the output direction, and the same chain
/// on a borrowed ifb pseudo-device, fed by an ingress redirect, for the
/// input direction.
#[derive(Debug, Default)]
pub struct Tbf {
    /// The pseudo-device borrowed for input shaping, held until undo.
    ifb: Option<String>,
}

impl Tbf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ifb(&self) -> Option<&str> {
        self.ifb.as_deref()
    }

    pub async fn apply(
        &mut self,
        shell: &dyn Shell,
        ifbs: &IfbAllocator,
        device: &str,
        iface: &VIface,
    ) -> Result<()> {
        if let Some(output) = iface.output.as_ref().filter(|t| t.limited()) {
            for cmd in chain_commands(device, output) {
                shell.run(&cmd).await?;
            }
        }
        if let Some(input) = iface.input.as_ref().filter(|t| t.limited()) {
            let ifb = ifbs.get_ifb(shell).await?;
            let mut commands = vec![QdiscIngress::new(device).add()];
            commands.extend(chain_commands(&ifb, input));
            commands.push(FilterU32::ingress_redirect(device, TcId::new(1), &ifb).add());
            self.ifb = Some(ifb);
            for cmd in commands {
                shell.run(&cmd).await?;
            }
        }
        Ok(())
    }

    /// Tears down whatever shaping currently exists on the device (and its
    /// ifb twin), returning the pseudo-device to the pool. Queries the
    /// kernel first and only deletes roots that were actually created, so
    /// calling this without a prior `apply`, or twice, is safe. A failed
    /// query means the device itself is gone (container stopped), which
    /// leaves nothing to delete; the ifb goes back to the pool regardless.
    pub async fn undo(
        &mut self,
        shell: &dyn Shell,
        ifbs: &IfbAllocator,
        device: &str,
    ) -> Result<()> {
        if let Some(listing) = shell.run_tolerant(&format!("tc qdisc show dev {device}")).await {
            if has_custom_root(&listing) {
                shell.run(&QdiscRoot::new(device).del()).await?;
            }
            if has_ingress(&listing) {
                shell.run(&QdiscIngress::new(device).del()).await?;
            }
        }
        if let Some(ifb) = self.ifb.take() {
            if let Some(listing) = shell.run_tolerant(&format!("tc qdisc show dev {ifb}")).await {
                if has_custom_root(&listing) {
                    shell.run(&QdiscRoot::new(&ifb).del()).await?;
                }
            }
            ifbs.free_ifb(&ifb);
        }
        Ok(())
    }
}

/// Renders the add-command sequence for one direction's shaping chain on
/// `device`, parent before child. The device root is an attachment point,
/// not a command of its own; the first stage installs itself as the root.
/// Handles are fully assigned before any command is issued.
fn chain_commands(device: &str, traffic: &VTraffic) -> Vec<String> {
    let mut seq = MajorSeq::new();
    let mut commands = Vec::new();
    match (&traffic.bandwidth, &traffic.latency) {
        (Some(bw), latency) => {
            let mut tbf = Qdisc::root_child(device, 1, QdiscKind::tbf(&bw.rate));
            commands.push(tbf.add());
            if let Some(lat) = latency {
                let netem =
                    Qdisc::child(device, tbf.child_ref(), seq.next(), QdiscKind::netem(lat.delay_ms));
                commands.push(netem.add());
            }
        }
        (None, Some(lat)) => {
            let netem = Qdisc::root_child(device, 1, QdiscKind::netem(lat.delay_ms));
            commands.push(netem.add());
        }
        (None, None) => {}
    }
    commands
}

/// Whether the `tc qdisc show` listing contains a root we created, as
/// opposed to the default discipline every device carries.
fn has_custom_root(listing: &str) -> bool {
    listing.lines().any(|line| {
        let mut parts = line.split_whitespace();
        parts.next() == Some("qdisc")
            && !matches!(parts.next(), Some("pfifo_fast" | "noqueue" | "mq" | "ingress") | None)
    })
}

fn has_ingress(listing: &str) -> bool {
    listing.lines().any(|line| line.starts_with("qdisc ingress"))
}
