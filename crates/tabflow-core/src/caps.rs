//! Capability vector attached to every op and aggregated per plan.

use bitflags::bitflags;

bitflags! {
    /// Properties of an op or a whole plan.
    ///
    /// The first four are qualities a plan only has when every node has them;
    /// FS and NET are effects a plan has as soon as any node has them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Caps: u8 {
        /// Emits output without waiting for end-of-input.
        const STREAMING = 1 << 0;
        /// Peak memory independent of input size.
        const BOUNDED_MEMORY = 1 << 1;
        /// No filesystem or network access.
        const BROWSER_SAFE = 1 << 2;
        /// Output depends only on input.
        const DETERMINISTIC = 1 << 3;
        /// Reads or writes files.
        const FS = 1 << 4;
        /// Talks to the network.
        const NET = 1 << 5;
    }
}

impl Default for Caps {
    fn default() -> Caps {
        Caps::empty()
    }
}

impl Caps {
    /// AND-aggregated qualities.
    pub const QUALITIES: Caps = Caps::STREAMING
        .union(Caps::BOUNDED_MEMORY)
        .union(Caps::BROWSER_SAFE)
        .union(Caps::DETERMINISTIC);

    /// OR-aggregated effects.
    pub const EFFECTS: Caps = Caps::FS.union(Caps::NET);

    /// The common case: a pure streaming transform.
    pub const PURE_STREAMING: Caps = Caps::QUALITIES;

    /// Fold node capabilities into a plan capability.
    pub fn aggregate<I: IntoIterator<Item = Caps>>(nodes: I) -> Caps {
        let mut qualities = Caps::QUALITIES;
        let mut effects = Caps::empty();
        for c in nodes {
            qualities &= c & Caps::QUALITIES;
            effects |= c & Caps::EFFECTS;
        }
        qualities | effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualities_intersect_effects_union() {
        let decoder = Caps::PURE_STREAMING;
        let sort = Caps::BROWSER_SAFE | Caps::DETERMINISTIC;
        let join = Caps::DETERMINISTIC | Caps::FS;
        let agg = Caps::aggregate([decoder, sort, join]);
        assert!(!agg.contains(Caps::STREAMING));
        assert!(!agg.contains(Caps::BOUNDED_MEMORY));
        assert!(!agg.contains(Caps::BROWSER_SAFE));
        assert!(agg.contains(Caps::DETERMINISTIC));
        assert!(agg.contains(Caps::FS));
        assert!(!agg.contains(Caps::NET));
    }

    #[test]
    fn all_streaming_stays_streaming() {
        let agg = Caps::aggregate([Caps::PURE_STREAMING, Caps::PURE_STREAMING]);
        assert_eq!(agg, Caps::PURE_STREAMING);
    }
}
