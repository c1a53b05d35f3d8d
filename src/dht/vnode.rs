#![warn(missing_docs)]
//! Virtual node descriptors.

use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

/// Descriptor of a virtual node, local or remote: its m-bit ring
/// identifier and the transport address of the hosting process.
/// Descriptors passed over the transport are value copies; two
/// descriptors are equal iff their identifiers are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vnode {
    /// Big-endian m-bit ring identifier.
    pub id: Vec<u8>,
    /// Transport address of the owning process.
    pub host: String,
}

impl Vnode {
    /// Build a descriptor from an identifier and a host address.
    pub fn new(id: Vec<u8>, host: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
        }
    }
}

impl fmt::Display for Vnode {
    /// The stable string form of a vnode is the lowercase hex of its
    /// identifier. It is used as the transport registry key.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.id))
    }
}

impl PartialEq for Vnode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Vnode {}

impl Hash for Vnode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
