//! Classifier command builders.

use super::handle::TcId;
use super::qdisc::QdiscIngress;

/// A u32 catch-all classifier that redirects everything reaching its
/// parent onto another device's queueing pipeline. This is the ingress
/// half of inbound shaping: traffic hitting the real device's ingress
/// qdisc gets mirrored onto the ifb twin.
#[derive(Debug)]
pub struct FilterU32 {
    device: String,
    parent: String,
    flowid: TcId,
    redirect_dev: String,
}

impl FilterU32 {
    /// A catch-all on `device`'s ingress qdisc redirecting to
    /// `redirect_dev`, classified into `flowid` there.
    pub fn ingress_redirect(device: &str, flowid: TcId, redirect_dev: &str) -> Self {
        Self {
            device: device.to_string(),
            parent: QdiscIngress::HANDLE.to_string(),
            flowid,
            redirect_dev: redirect_dev.to_string(),
        }
    }

    pub fn add(&self) -> String {
        format!(
            "tc filter add dev {} parent {} protocol ip u32 match u32 0 0 flowid {} \
             action mirred egress redirect dev {}",
            self.device, self.parent, self.flowid, self.redirect_dev
        )
    }
}
