//! The entity table: central owner of all particles and containers.
//!
//! Every attribute and derivative access goes through the table, which is
//! what lets it enforce the stage discipline and the declared-access marks
//! installed by the engine's validator.

use std::collections::HashSet;
use std::fmt;

use slotmap::SlotMap;

use super::container::ContainerRecord;
use super::derivatives::DerivativeAccumulator;
use super::keys::{ContainerKey, FloatKey, ParticleKey};
use super::particle::ParticleRecord;
use crate::error::{ModelError, Result};
use crate::stage::Stage;

/// Whether a forbidden access was a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reading an attribute or derivative.
    Read,
    /// Writing an attribute or accumulating a derivative.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        })
    }
}

/// Central storage for particles and containers, plus the evaluation stage.
///
/// Particles and containers live in slotmap arenas; keys stay valid until
/// the entity is removed. Registration-order iteration is preserved
/// separately so evaluation results are deterministic.
///
/// # Example
///
/// ```
/// use scoreflow_core::{EntityTable, FloatKey};
///
/// const X: FloatKey = FloatKey::new(0);
///
/// let mut table = EntityTable::new();
/// let p = table.add_particle("p0").unwrap();
/// table.add_attribute(p, X, 1.5).unwrap();
/// assert_eq!(table.attribute(p, X).unwrap(), 1.5);
/// ```
#[derive(Debug, Default)]
pub struct EntityTable {
    particles: SlotMap<ParticleKey, ParticleRecord>,
    particle_order: Vec<ParticleKey>,
    containers: SlotMap<ContainerKey, ContainerRecord>,
    container_order: Vec<ContainerKey>,
    stage: Stage,
}

impl EntityTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current evaluation stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Sets the evaluation stage. Engine plumbing; units never call this.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    fn check_not_evaluating(&self, what: &str) -> Result<()> {
        if self.stage != Stage::NotEvaluating {
            return Err(ModelError::Usage(format!(
                "{what} is not allowed during evaluation (stage is {})",
                self.stage
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Particles
    // ------------------------------------------------------------------

    /// Adds a particle. Fails while an evaluation is in progress.
    pub fn add_particle(&mut self, name: impl Into<String>) -> Result<ParticleKey> {
        self.check_not_evaluating("adding a particle")?;
        let key = self.particles.insert(ParticleRecord::new(name.into()));
        self.particle_order.push(key);
        Ok(key)
    }

    /// Removes a particle. Fails while an evaluation is in progress.
    ///
    /// Containers keep whatever keys they were given; stale members are
    /// skipped when containers are flattened.
    pub fn remove_particle(&mut self, particle: ParticleKey) -> Result<()> {
        self.check_not_evaluating("removing a particle")?;
        self.particles
            .remove(particle)
            .ok_or(ModelError::UnknownParticle)?;
        self.particle_order.retain(|&k| k != particle);
        Ok(())
    }

    /// Returns true if the key refers to a live particle.
    pub fn contains_particle(&self, particle: ParticleKey) -> bool {
        self.particles.contains_key(particle)
    }

    /// Number of live particles.
    pub fn particle_count(&self) -> usize {
        self.particle_order.len()
    }

    /// Iterates particle keys in registration order.
    pub fn particle_keys(&self) -> impl Iterator<Item = ParticleKey> + '_ {
        self.particle_order.iter().copied()
    }

    /// Returns the particle's name.
    pub fn particle_name(&self, particle: ParticleKey) -> Result<&str> {
        self.particles
            .get(particle)
            .map(|r| r.name.as_str())
            .ok_or(ModelError::UnknownParticle)
    }

    // ------------------------------------------------------------------
    // Attributes and derivatives
    // ------------------------------------------------------------------

    /// Adds a float attribute slot with an initial value.
    ///
    /// Fails during evaluation and if the slot is already present.
    pub fn add_attribute(&mut self, particle: ParticleKey, key: FloatKey, value: f64) -> Result<()> {
        self.check_not_evaluating("adding an attribute")?;
        let record = self
            .particles
            .get_mut(particle)
            .ok_or(ModelError::UnknownParticle)?;
        record.grow_to(key.index());
        if record.attributes[key.index()].is_some() {
            return Err(ModelError::Usage(format!(
                "particle \"{}\" already has attribute {key}",
                record.name
            )));
        }
        record.attributes[key.index()] = Some(value);
        Ok(())
    }

    /// Returns true if the particle carries the attribute.
    pub fn has_attribute(&self, particle: ParticleKey, key: FloatKey) -> bool {
        self.particles
            .get(particle)
            .and_then(|r| r.attributes.get(key.index()).copied().flatten())
            .is_some()
    }

    /// Reads an attribute value.
    ///
    /// Fails with an access violation if the particle is read-forbidden for
    /// the unit currently running.
    pub fn attribute(&self, particle: ParticleKey, key: FloatKey) -> Result<f64> {
        let record = self
            .particles
            .get(particle)
            .ok_or(ModelError::UnknownParticle)?;
        if record.read_forbidden {
            return Err(Self::violation(record, AccessMode::Read));
        }
        record
            .attributes
            .get(key.index())
            .copied()
            .flatten()
            .ok_or_else(|| ModelError::MissingAttribute {
                particle: record.name.clone(),
                attribute: key,
            })
    }

    /// Writes an attribute value and marks the particle changed.
    ///
    /// Attribute values may not change while restraints are being evaluated
    /// or during the after phase; score states mutate state in their
    /// `before` hooks, restraints never do.
    pub fn set_attribute(&mut self, particle: ParticleKey, key: FloatKey, value: f64) -> Result<()> {
        match self.stage {
            Stage::Evaluate => {
                return Err(ModelError::Usage(
                    "restraints are not allowed to change attribute values during evaluation"
                        .into(),
                ))
            }
            Stage::AfterEvaluate => {
                return Err(ModelError::Usage(
                    "score states are not allowed to change attribute values after evaluation"
                        .into(),
                ))
            }
            _ => {}
        }
        let record = self
            .particles
            .get_mut(particle)
            .ok_or(ModelError::UnknownParticle)?;
        if record.write_forbidden {
            return Err(Self::violation(record, AccessMode::Write));
        }
        let slot = record
            .attributes
            .get_mut(key.index())
            .and_then(|s| s.as_mut());
        match slot {
            Some(slot) => {
                *slot = value;
                record.changed = true;
                Ok(())
            }
            None => Err(ModelError::MissingAttribute {
                particle: record.name.clone(),
                attribute: key,
            }),
        }
    }

    /// Reads an accumulated derivative.
    ///
    /// Derivatives are only meaningful once restraint evaluation has run, so
    /// reads are rejected during the before phase.
    pub fn derivative(&self, particle: ParticleKey, key: FloatKey) -> Result<f64> {
        if self.stage == Stage::BeforeEvaluate {
            return Err(ModelError::Usage(
                "derivatives cannot be read during the before phase".into(),
            ));
        }
        let record = self
            .particles
            .get(particle)
            .ok_or(ModelError::UnknownParticle)?;
        if record.read_forbidden {
            return Err(Self::violation(record, AccessMode::Read));
        }
        if record.attributes.get(key.index()).copied().flatten().is_none() {
            return Err(ModelError::MissingAttribute {
                particle: record.name.clone(),
                attribute: key,
            });
        }
        Ok(record.derivatives[key.index()])
    }

    /// Accumulates a derivative contribution through `accum`.
    ///
    /// Only allowed during restraint evaluation, the after phase, or outside
    /// evaluation entirely.
    pub fn add_derivative(
        &mut self,
        particle: ParticleKey,
        key: FloatKey,
        value: f64,
        accum: &DerivativeAccumulator,
    ) -> Result<()> {
        if self.stage == Stage::BeforeEvaluate {
            return Err(ModelError::Usage(
                "derivatives can only be accumulated during restraint evaluation \
                 and after-evaluate calls"
                    .into(),
            ));
        }
        let record = self
            .particles
            .get_mut(particle)
            .ok_or(ModelError::UnknownParticle)?;
        if record.write_forbidden {
            return Err(Self::violation(record, AccessMode::Write));
        }
        if record.attributes.get(key.index()).copied().flatten().is_none() {
            return Err(ModelError::MissingAttribute {
                particle: record.name.clone(),
                attribute: key,
            });
        }
        record.derivatives[key.index()] += accum.apply(value);
        Ok(())
    }

    /// Returns whether the particle's attributes changed since the last
    /// completed evaluation.
    pub fn is_changed(&self, particle: ParticleKey) -> Result<bool> {
        self.particles
            .get(particle)
            .map(|r| r.changed)
            .ok_or(ModelError::UnknownParticle)
    }

    fn violation(record: &ParticleRecord, mode: AccessMode) -> ModelError {
        // The unit name is filled in by the engine when it unwinds the hook.
        ModelError::AccessViolation {
            unit: String::new(),
            particle: record.name.clone(),
            mode,
        }
    }

    // ------------------------------------------------------------------
    // Containers
    // ------------------------------------------------------------------

    /// Adds an empty container. Fails while an evaluation is in progress.
    pub fn add_container(&mut self, name: impl Into<String>) -> Result<ContainerKey> {
        self.check_not_evaluating("adding a container")?;
        let key = self.containers.insert(ContainerRecord::new(name.into()));
        self.container_order.push(key);
        Ok(key)
    }

    /// Removes a container. Fails while an evaluation is in progress.
    pub fn remove_container(&mut self, container: ContainerKey) -> Result<()> {
        self.check_not_evaluating("removing a container")?;
        self.containers
            .remove(container)
            .ok_or(ModelError::UnknownContainer)?;
        self.container_order.retain(|&k| k != container);
        Ok(())
    }

    /// Returns true if the key refers to a live container.
    pub fn contains_container(&self, container: ContainerKey) -> bool {
        self.containers.contains_key(container)
    }

    /// Returns the container's name.
    pub fn container_name(&self, container: ContainerKey) -> Result<&str> {
        self.containers
            .get(container)
            .map(|r| r.name.as_str())
            .ok_or(ModelError::UnknownContainer)
    }

    /// Replaces a container's member lists.
    ///
    /// Allowed outside evaluation and during the before phase, where the
    /// score state computing the container rewrites it.
    pub fn set_container_members(
        &mut self,
        container: ContainerKey,
        particles: &[ParticleKey],
        subcontainers: &[ContainerKey],
    ) -> Result<()> {
        match self.stage {
            Stage::NotEvaluating | Stage::BeforeEvaluate => {}
            stage => {
                return Err(ModelError::Usage(format!(
                    "container members cannot change during the {stage} stage"
                )))
            }
        }
        let record = self
            .containers
            .get_mut(container)
            .ok_or(ModelError::UnknownContainer)?;
        record.particles = particles.to_vec();
        record.subcontainers = subcontainers.to_vec();
        Ok(())
    }

    /// Returns the container's direct particle members.
    pub fn container_particles(&self, container: ContainerKey) -> Result<&[ParticleKey]> {
        self.containers
            .get(container)
            .map(|r| r.particles.as_slice())
            .ok_or(ModelError::UnknownContainer)
    }

    /// Returns the container's direct sub-containers.
    pub fn container_subcontainers(&self, container: ContainerKey) -> Result<&[ContainerKey]> {
        self.containers
            .get(container)
            .map(|r| r.subcontainers.as_slice())
            .ok_or(ModelError::UnknownContainer)
    }

    /// Resolves a container to its particle members, recursively.
    ///
    /// Stale keys are skipped. Reference cycles between containers are
    /// tolerated (each container is visited once); only the dependency
    /// graph must stay acyclic, not the reference graph.
    pub fn flattened_particles(&self, container: ContainerKey) -> Result<Vec<ParticleKey>> {
        if !self.containers.contains_key(container) {
            return Err(ModelError::UnknownContainer);
        }
        let mut seen_containers = HashSet::new();
        let mut seen_particles = HashSet::new();
        let mut out = Vec::new();
        let mut pending = vec![container];
        while let Some(next) = pending.pop() {
            if !seen_containers.insert(next) {
                continue;
            }
            let Some(record) = self.containers.get(next) else {
                continue;
            };
            for &p in &record.particles {
                if self.particles.contains_key(p) && seen_particles.insert(p) {
                    out.push(p);
                }
            }
            pending.extend(record.subcontainers.iter().copied());
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Engine plumbing: derivatives bookkeeping
    // ------------------------------------------------------------------

    /// Zeroes every derivative; with `include_shadow`, the incremental
    /// shadow buffers too.
    pub fn zero_derivatives(&mut self, include_shadow: bool) {
        for record in self.particles.values_mut() {
            record.derivatives.iter_mut().for_each(|d| *d = 0.0);
            if include_shadow {
                record.shadow.iter_mut().for_each(|d| *d = 0.0);
            }
        }
    }

    /// Folds the current derivatives into the shadow buffers and clears
    /// them, leaving the shadow holding the incremental running totals.
    pub fn move_derivatives_to_shadow(&mut self) {
        for record in self.particles.values_mut() {
            for i in 0..record.derivatives.len() {
                record.shadow[i] += record.derivatives[i];
                record.derivatives[i] = 0.0;
            }
        }
    }

    /// Adds the shadow totals back into the derivatives.
    pub fn accumulate_shadow_derivatives(&mut self) {
        for record in self.particles.values_mut() {
            for i in 0..record.derivatives.len() {
                record.derivatives[i] += record.shadow[i];
            }
        }
    }

    /// Copies out every particle's derivatives, in registration order.
    pub fn snapshot_derivatives(&self) -> Vec<Vec<f64>> {
        self.particle_order
            .iter()
            .filter_map(|&k| self.particles.get(k))
            .map(|r| r.derivatives.clone())
            .collect()
    }

    /// Restores a snapshot taken by [`snapshot_derivatives`].
    ///
    /// [`snapshot_derivatives`]: EntityTable::snapshot_derivatives
    pub fn restore_derivatives(&mut self, snapshot: &[Vec<f64>]) -> Result<()> {
        if snapshot.len() != self.particle_order.len() {
            return Err(ModelError::Internal(
                "derivative snapshot does not match the particle set".into(),
            ));
        }
        for (&key, saved) in self.particle_order.iter().zip(snapshot) {
            let record = self
                .particles
                .get_mut(key)
                .ok_or(ModelError::UnknownParticle)?;
            record.derivatives.copy_from_slice(saved);
        }
        Ok(())
    }

    /// Compares current derivatives against a snapshot within an
    /// absolute-plus-relative tolerance.
    ///
    /// The snapshot is treated as the incremental result and the current
    /// values as the full recomputation.
    pub fn compare_derivatives(
        &self,
        snapshot: &[Vec<f64>],
        absolute: f64,
        relative: f64,
    ) -> Result<()> {
        for (&key, saved) in self.particle_order.iter().zip(snapshot) {
            let record = self
                .particles
                .get(key)
                .ok_or(ModelError::UnknownParticle)?;
            for (i, (&incremental, &full)) in saved.iter().zip(&record.derivatives).enumerate() {
                if (incremental - full).abs() > absolute + relative * (incremental + full).abs() {
                    return Err(ModelError::InconsistentDerivative {
                        particle: record.name.clone(),
                        attribute: FloatKey::new(i as u32),
                        incremental,
                        full,
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks every committed attribute and derivative for NaN/infinity.
    pub fn validate_finite(&self) -> Result<()> {
        for &key in &self.particle_order {
            let record = self
                .particles
                .get(key)
                .ok_or(ModelError::UnknownParticle)?;
            for (i, slot) in record.attributes.iter().enumerate() {
                if let Some(value) = slot {
                    if !value.is_finite() {
                        return Err(ModelError::NonFinite {
                            particle: record.name.clone(),
                            attribute: FloatKey::new(i as u32),
                            value: *value,
                        });
                    }
                }
                let deriv = record.derivatives[i];
                if !deriv.is_finite() {
                    return Err(ModelError::NonFinite {
                        particle: record.name.clone(),
                        attribute: FloatKey::new(i as u32),
                        value: deriv,
                    });
                }
            }
        }
        Ok(())
    }

    /// Clears every particle's changed flag.
    pub fn clear_changed_flags(&mut self) {
        for record in self.particles.values_mut() {
            record.changed = false;
        }
    }

    // ------------------------------------------------------------------
    // Engine plumbing: declared-access marks
    // ------------------------------------------------------------------

    /// Marks every particle outside `readable`/`writable` as forbidden for
    /// the corresponding access mode. Installed by the engine's validator
    /// around hook calls in debug builds.
    pub fn restrict_access(
        &mut self,
        readable: &HashSet<ParticleKey>,
        writable: &HashSet<ParticleKey>,
    ) {
        for (key, record) in self.particles.iter_mut() {
            record.read_forbidden = !readable.contains(&key);
            record.write_forbidden = !writable.contains(&key);
        }
    }

    /// Clears all access marks.
    pub fn clear_access_restrictions(&mut self) {
        for record in self.particles.values_mut() {
            record.read_forbidden = false;
            record.write_forbidden = false;
        }
    }
}
