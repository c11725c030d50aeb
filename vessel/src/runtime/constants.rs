//! Constants for the vessel runtime.

// Re-export the engine-wide constants from vessel-shared.
pub use vessel_shared::constants::{defaults, dirs, files};

pub mod envs {
    /// Overrides the engine home directory.
    pub const VESSEL_HOME: &str = "VESSEL_HOME";

    /// Preferred location for the per-boot tmp directory.
    pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
}

/// Word lists for generated container and pod names.
pub mod names {
    pub const ADJECTIVES: &[&str] = &[
        "amber", "bold", "brisk", "calm", "clever", "deep", "eager", "fleet", "gentle", "keen",
        "lively", "mellow", "nimble", "patient", "proud", "quiet", "rapid", "steady", "stern",
        "swift", "tidy", "vivid", "warm", "wry",
    ];

    pub const NOUNS: &[&str] = &[
        "anchor", "beacon", "bowline", "breeze", "buoy", "capstan", "compass", "current", "davit",
        "fathom", "galley", "halyard", "harbor", "helm", "jetty", "keel", "lantern", "mast",
        "pennant", "rudder", "sextant", "spar", "tide", "windlass",
    ];
}
