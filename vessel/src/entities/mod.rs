//! Entity records tracked by the state store: containers, pods, volumes.

pub mod container;
pub mod pod;
pub mod status;
pub mod volume;

pub use container::{ContainerConfig, ContainerRecord};
pub use pod::{PodConfig, PodRecord};
pub use status::ContainerStatus;
pub use volume::{VolumeConfig, VolumeRecord};

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a full entity ID (64 hex chars = 256 bits).
pub const ID_FULL_LENGTH: usize = 64;

/// Length of the short display form (12 hex chars).
pub const ID_SHORT_LENGTH: usize = 12;

fn generate_hex_id() -> String {
    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);

    let mut hasher = Sha256::new();
    hasher.update(random_bytes);
    hex::encode(hasher.finalize())
}

fn is_valid_hex_id(s: &str) -> bool {
    s.len() == ID_FULL_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
}

macro_rules! hex_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(generate_hex_id())
            }

            /// Parse an ID from an existing string.
            ///
            /// Returns `None` unless the string is a 64-char lowercase hex
            /// string.
            pub fn parse(s: &str) -> Option<Self> {
                if is_valid_hex_id(s) {
                    Some(Self(s.to_string()))
                } else {
                    None
                }
            }

            /// Full ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Short form (first 12 characters) for display.
            pub fn short(&self) -> &str {
                &self.0[..ID_SHORT_LENGTH]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

hex_id_type! {
    /// Container identifier (64-character lowercase hex, OCI convention).
    ContainerId
}

hex_id_type! {
    /// Pod identifier (64-character lowercase hex, same format as
    /// container IDs).
    PodId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_new() {
        let id1 = ContainerId::new();
        let id2 = ContainerId::new();

        assert_eq!(id1.as_str().len(), ID_FULL_LENGTH);
        assert_ne!(id1, id2);
        assert!(
            id1.as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
        );
    }

    #[test]
    fn test_container_id_short_is_prefix() {
        let id = ContainerId::new();
        assert_eq!(id.short().len(), ID_SHORT_LENGTH);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn test_container_id_parse() {
        let valid = "a".repeat(64);
        assert!(ContainerId::parse(&valid).is_some());

        assert!(ContainerId::parse("abc123").is_none());
        assert!(ContainerId::parse(&"A".repeat(64)).is_none());
        assert!(ContainerId::parse(&"g".repeat(64)).is_none());
    }

    #[test]
    fn test_pod_id_format() {
        let id = PodId::new();
        assert_eq!(id.as_str().len(), ID_FULL_LENGTH);

        let debug = format!("{:?}", id);
        assert!(debug.starts_with("PodId("));
        assert!(debug.contains(id.short()));
    }
}
