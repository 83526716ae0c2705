//! Arena-backed storage for particles and containers.
//!
//! Particles and containers are owned centrally by an [`EntityTable`] and
//! referenced everywhere else by stable keys, so back-references between
//! units and entities are plain copyable identifiers rather than a pointer
//! graph.

mod container;
mod derivatives;
mod keys;
mod particle;
mod table;

#[cfg(test)]
mod tests;

pub use derivatives::DerivativeAccumulator;
pub use keys::{ContainerKey, FloatKey, ParticleKey};
pub use table::{AccessMode, EntityTable};

use smallvec::SmallVec;

/// A small owned list of particle keys, as returned by declared-set queries.
pub type Particles = SmallVec<[ParticleKey; 8]>;

/// A small owned list of container keys, as returned by declared-set queries.
pub type Containers = SmallVec<[ContainerKey; 4]>;
