//! Scheduling fixtures.

use scoreflow_core::{
    ContainerKey, Containers, DerivativeAccumulator, EntityTable, FloatKey, ParticleKey, Particles,
    Result, ScoreState,
};
use smallvec::SmallVec;

use crate::{push_event, EventLog, X, Y, Z};

/// Maintains `target = factor * source` for one attribute.
///
/// The after hook propagates the target's derivative back onto the source
/// by the chain rule. An optional event log records hook invocations.
pub struct ScaleState {
    name: String,
    source: ParticleKey,
    target: ParticleKey,
    key: FloatKey,
    factor: f64,
    log: Option<EventLog>,
}

impl ScaleState {
    pub fn new(
        name: impl Into<String>,
        source: ParticleKey,
        target: ParticleKey,
        key: FloatKey,
        factor: f64,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            key,
            factor,
            log: None,
        }
    }

    /// Records `"{name}:before"` / `"{name}:after"` events into `log`.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }
}

impl ScoreState for ScaleState {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_evaluate(&mut self, table: &mut EntityTable) -> Result<()> {
        let value = table.attribute(self.source, self.key)?;
        table.set_attribute(self.target, self.key, self.factor * value)?;
        push_event(&self.log, format!("{}:before", self.name));
        Ok(())
    }

    fn after_evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        if let Some(accum) = accum {
            let downstream = table.derivative(self.target, self.key)?;
            table.add_derivative(self.source, self.key, self.factor * downstream, accum)?;
        }
        push_event(&self.log, format!("{}:after", self.name));
        Ok(())
    }

    fn input_particles(&self) -> Particles {
        let mut out = Particles::new();
        out.push(self.source);
        out
    }

    fn output_particles(&self) -> Particles {
        let mut out = Particles::new();
        out.push(self.target);
        out
    }
}

/// Maintains a centroid particle at the mean X/Y/Z of its members.
///
/// The after hook spreads the centroid's derivatives evenly across the
/// members.
pub struct CentroidState {
    name: String,
    members: Vec<ParticleKey>,
    centroid: ParticleKey,
}

impl CentroidState {
    pub fn new(name: impl Into<String>, members: Vec<ParticleKey>, centroid: ParticleKey) -> Self {
        Self {
            name: name.into(),
            members,
            centroid,
        }
    }
}

impl ScoreState for CentroidState {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_evaluate(&mut self, table: &mut EntityTable) -> Result<()> {
        let count = self.members.len().max(1) as f64;
        for key in [X, Y, Z] {
            let mut sum = 0.0;
            for &m in &self.members {
                sum += table.attribute(m, key)?;
            }
            table.set_attribute(self.centroid, key, sum / count)?;
        }
        Ok(())
    }

    fn after_evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        let Some(accum) = accum else {
            return Ok(());
        };
        let count = self.members.len().max(1) as f64;
        for key in [X, Y, Z] {
            let share = table.derivative(self.centroid, key)? / count;
            for &m in &self.members {
                table.add_derivative(m, key, share, accum)?;
            }
        }
        Ok(())
    }

    fn input_particles(&self) -> Particles {
        SmallVec::from_slice(&self.members)
    }

    fn output_particles(&self) -> Particles {
        let mut out = Particles::new();
        out.push(self.centroid);
        out
    }
}

/// Computes a container by gathering a fixed member list into it.
pub struct GatherState {
    name: String,
    members: Vec<ParticleKey>,
    container: ContainerKey,
}

impl GatherState {
    pub fn new(
        name: impl Into<String>,
        members: Vec<ParticleKey>,
        container: ContainerKey,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            container,
        }
    }
}

impl ScoreState for GatherState {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_evaluate(&mut self, table: &mut EntityTable) -> Result<()> {
        table.set_container_members(self.container, &self.members, &[])
    }

    fn after_evaluate(
        &mut self,
        _table: &mut EntityTable,
        _accum: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        Ok(())
    }

    fn input_particles(&self) -> Particles {
        SmallVec::from_slice(&self.members)
    }

    fn output_particles(&self) -> Particles {
        Particles::new()
    }

    fn output_containers(&self) -> Containers {
        let mut out = Containers::new();
        out.push(self.container);
        out
    }
}

/// Touches nothing; only declares dependencies and records hook order.
pub struct RecordingState {
    name: String,
    inputs: Vec<ParticleKey>,
    outputs: Vec<ParticleKey>,
    log: EventLog,
}

impl RecordingState {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<ParticleKey>,
        outputs: Vec<ParticleKey>,
        log: EventLog,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            log,
        }
    }
}

impl ScoreState for RecordingState {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_evaluate(&mut self, _table: &mut EntityTable) -> Result<()> {
        push_event(&Some(self.log.clone()), format!("{}:before", self.name));
        Ok(())
    }

    fn after_evaluate(
        &mut self,
        _table: &mut EntityTable,
        _accum: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        push_event(&Some(self.log.clone()), format!("{}:after", self.name));
        Ok(())
    }

    fn input_particles(&self) -> Particles {
        SmallVec::from_slice(&self.inputs)
    }

    fn output_particles(&self) -> Particles {
        SmallVec::from_slice(&self.outputs)
    }
}

/// Declares one output particle but writes a different one.
///
/// Exists to exercise the declared-access validator.
pub struct TrespassingState {
    name: String,
    declared: ParticleKey,
    victim: ParticleKey,
    key: FloatKey,
}

impl TrespassingState {
    pub fn new(
        name: impl Into<String>,
        declared: ParticleKey,
        victim: ParticleKey,
        key: FloatKey,
    ) -> Self {
        Self {
            name: name.into(),
            declared,
            victim,
            key,
        }
    }
}

impl ScoreState for TrespassingState {
    fn name(&self) -> &str {
        &self.name
    }

    fn before_evaluate(&mut self, table: &mut EntityTable) -> Result<()> {
        table.set_attribute(self.victim, self.key, 1.0)
    }

    fn after_evaluate(
        &mut self,
        _table: &mut EntityTable,
        _accum: Option<&DerivativeAccumulator>,
    ) -> Result<()> {
        Ok(())
    }

    fn input_particles(&self) -> Particles {
        Particles::new()
    }

    fn output_particles(&self) -> Particles {
        let mut out = Particles::new();
        out.push(self.declared);
        out
    }
}
