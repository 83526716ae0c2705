// Per-container storage: named member lists.

use super::keys::{ContainerKey, ParticleKey};

/// Backing storage for one container: an ordered list of member particles
/// and sub-containers. Computed containers get their members rewritten by
/// their producing score state during the before phase.
#[derive(Debug)]
pub(crate) struct ContainerRecord {
    pub(crate) name: String,
    pub(crate) particles: Vec<ParticleKey>,
    pub(crate) subcontainers: Vec<ContainerKey>,
}

impl ContainerRecord {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            particles: Vec::new(),
            subcontainers: Vec::new(),
        }
    }
}
