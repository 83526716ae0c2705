//! Stable identifiers for entities and attribute slots.

use std::fmt;

slotmap::new_key_type! {
    /// Stable key of a particle in an [`EntityTable`](super::EntityTable).
    pub struct ParticleKey;

    /// Stable key of a container in an [`EntityTable`](super::EntityTable).
    pub struct ContainerKey;
}

/// Index of a float attribute slot on a particle.
///
/// Keys are plain indices; there is no global name interner. Callers that
/// want named attributes define constants:
///
/// ```
/// use scoreflow_core::FloatKey;
///
/// const X: FloatKey = FloatKey::new(0);
/// const Y: FloatKey = FloatKey::new(1);
/// assert_ne!(X, Y);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatKey(u32);

impl FloatKey {
    /// Creates a key for the attribute slot at `index`.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FloatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "float#{}", self.0)
    }
}
