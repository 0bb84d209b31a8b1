//! Builders rendering kernel traffic-control commands.
//!
//! Shaping a device means building a tree of queueing disciplines: a root
//! on the device, a token-bucket filter under it when a rate cap is set,
//! a netem stage under the deepest node when a delay is set. Inbound
//! shaping cannot be classful on ingress, so an ingress qdisc on the real
//! device redirects all traffic (through a u32 catch-all filter) onto an
//! ifb pseudo-device carrying a twin of the outbound tree.
//!
//! Every tree node renders exactly one `tc ... add` command carrying its
//! own handle and its parent's; handles derive deterministically from the
//! parent (see [`handle`]), so nested stages never collide without any
//! global registry. Commands are plain strings run through
//! [`crate::command::Shell`], parent before child.

pub mod filter;
pub mod handle;
pub mod qdisc;

pub use filter::FilterU32;
pub use handle::{MajorSeq, TcId};
pub use qdisc::{Qdisc, QdiscIngress, QdiscKind, QdiscRoot};
