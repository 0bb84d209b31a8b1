//! Deterministic traffic-control handles.
//!
//! A qdisc handle is `major:minor`. Qdiscs own `minor = 0` and print as
//! `major:`; references to a spot under a classful qdisc carry a nonzero
//! minor printed in hex (`1:0x1`). A node's id derives from its parent by
//! incrementing the parent's minor counter, so sibling ids never collide
//! and no global registry is needed.

use std::fmt;

/// A `major:minor` handle plus the counter its children derive from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcId {
    major: u16,
    minor: u16,
    next_minor: u16,
}

impl TcId {
    /// A qdisc handle (`minor = 0`).
    pub fn new(major: u16) -> Self {
        Self { major, minor: 0, next_minor: 0 }
    }

    pub fn major(&self) -> u16 {
        self.major
    }

    pub fn minor(&self) -> u16 {
        self.minor
    }

    /// Derives the next child reference under this handle by bumping the
    /// minor counter.
    pub fn child_ref(&mut self) -> Self {
        self.next_minor += 1;
        Self { major: self.major, minor: self.next_minor, next_minor: 0 }
    }
}

impl fmt::Display for TcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minor == 0 {
            write!(f, "{}:", self.major)
        } else {
            write!(f, "{}:0x{:x}", self.major, self.minor)
        }
    }
}

/// Per-device source of fresh qdisc majors for stages below the first one.
/// Yields 10, 20, 30, … so rendered handles stay visually distinct from
/// the root's `1:`.
#[derive(Debug, Default)]
pub struct MajorSeq {
    last: u16,
}

impl MajorSeq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u16 {
        self.last += 10;
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qdisc_handles_print_with_trailing_colon() {
        assert_eq!(TcId::new(1).to_string(), "1:");
        assert_eq!(TcId::new(10).to_string(), "10:");
    }

    #[test]
    fn child_refs_print_hex_minors_and_never_collide() {
        let mut root = TcId::new(1);
        let a = root.child_ref();
        let b = root.child_ref();
        assert_eq!(a.to_string(), "1:0x1");
        assert_eq!(b.to_string(), "1:0x2");
        assert_ne!(a, b);

        let c = root.child_ref();
        assert_eq!(c.minor(), 3);
    }

    #[test]
    fn major_seq_steps_by_ten() {
        let mut seq = MajorSeq::new();
        assert_eq!(seq.next(), 10);
        assert_eq!(seq.next(), 20);
        assert_eq!(TcId::new(seq.next()).to_string(), "30:");
    }
}
