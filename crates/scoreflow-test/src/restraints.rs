//! Scoring fixtures.

use std::collections::HashMap;

use scoreflow_core::{
    ContainerKey, Containers, DerivativeAccumulator, EntityTable, FloatKey, ParticleKey, Particles,
    Restraint, Result,
};
use smallvec::SmallVec;

use crate::{X, Y, Z};

/// Scores the sum of one attribute over a fixed particle list.
///
/// The gradient with respect to each particle's attribute is 1. In
/// incremental mode the restraint keeps per-particle contributions cached
/// and only revisits particles whose attributes changed; because the
/// gradient is constant, the incremental pass records no derivative deltas.
pub struct AttributeSumRestraint {
    name: String,
    particles: Vec<ParticleKey>,
    key: FloatKey,
    incremental: bool,
    cache: HashMap<ParticleKey, f64>,
    total: f64,
}

impl AttributeSumRestraint {
    /// A non-incremental sum restraint.
    pub fn new(name: impl Into<String>, particles: Vec<ParticleKey>, key: FloatKey) -> Self {
        Self {
            name: name.into(),
            particles,
            key,
            incremental: false,
            cache: HashMap::new(),
            total: 0.0,
        }
    }

    /// An incremental sum restraint.
    pub fn incremental(name: impl Into<String>, particles: Vec<ParticleKey>, key: FloatKey) -> Self {
        Self {
            incremental: true,
            ..Self::new(name, particles, key)
        }
    }
}

impl Restraint for AttributeSumRestraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        let mut total = 0.0;
        self.cache.clear();
        for &p in &self.particles {
            let value = table.attribute(p, self.key)?;
            self.cache.insert(p, value);
            if let Some(accum) = accum {
                table.add_derivative(p, self.key, 1.0, accum)?;
            }
            total += value;
        }
        self.total = total;
        Ok(total)
    }

    fn incremental_evaluate(
        &mut self,
        table: &mut EntityTable,
        _accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        for &p in &self.particles {
            if table.is_changed(p)? {
                let value = table.attribute(p, self.key)?;
                let old = self.cache.insert(p, value).unwrap_or(0.0);
                self.total += value - old;
            }
        }
        Ok(self.total)
    }

    fn input_particles(&self) -> Particles {
        SmallVec::from_slice(&self.particles)
    }

    fn is_incremental(&self) -> bool {
        self.incremental
    }
}

/// Scores the sum of one attribute over a container's flattened members.
pub struct ContainerSumRestraint {
    name: String,
    container: ContainerKey,
    key: FloatKey,
}

impl ContainerSumRestraint {
    pub fn new(name: impl Into<String>, container: ContainerKey, key: FloatKey) -> Self {
        Self {
            name: name.into(),
            container,
            key,
        }
    }
}

impl Restraint for ContainerSumRestraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        let mut total = 0.0;
        for p in table.flattened_particles(self.container)? {
            total += table.attribute(p, self.key)?;
            if let Some(accum) = accum {
                table.add_derivative(p, self.key, 1.0, accum)?;
            }
        }
        Ok(total)
    }

    fn input_particles(&self) -> Particles {
        Particles::new()
    }

    fn input_containers(&self) -> Containers {
        let mut out = Containers::new();
        out.push(self.container);
        out
    }
}

/// A harmonic restraint on the distance between two particles.
///
/// `score = 0.5 * k * (d - mean)^2` with `d` the euclidean distance over
/// the X/Y/Z attributes.
pub struct HarmonicDistanceRestraint {
    name: String,
    a: ParticleKey,
    b: ParticleKey,
    spring: f64,
    mean: f64,
}

impl HarmonicDistanceRestraint {
    pub fn new(
        name: impl Into<String>,
        a: ParticleKey,
        b: ParticleKey,
        spring: f64,
        mean: f64,
    ) -> Self {
        Self {
            name: name.into(),
            a,
            b,
            spring,
            mean,
        }
    }
}

impl Restraint for HarmonicDistanceRestraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        table: &mut EntityTable,
        accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        let mut delta = [0.0; 3];
        for (i, key) in [X, Y, Z].into_iter().enumerate() {
            delta[i] = table.attribute(self.a, key)? - table.attribute(self.b, key)?;
        }
        let distance = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        let diff = distance - self.mean;
        let score = 0.5 * self.spring * diff * diff;
        if let Some(accum) = accum {
            if distance > 1e-12 {
                let factor = self.spring * diff / distance;
                for (i, key) in [X, Y, Z].into_iter().enumerate() {
                    table.add_derivative(self.a, key, factor * delta[i], accum)?;
                    table.add_derivative(self.b, key, -factor * delta[i], accum)?;
                }
            }
        }
        Ok(score)
    }

    fn input_particles(&self) -> Particles {
        let mut out = Particles::new();
        out.push(self.a);
        out.push(self.b);
        out
    }
}

/// Returns a fixed score and touches nothing.
pub struct ConstantRestraint {
    name: String,
    value: f64,
    inputs: Vec<ParticleKey>,
}

impl ConstantRestraint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            inputs: Vec::new(),
        }
    }

    /// Declares input particles without reading them, to shape the
    /// dependency graph in tests.
    pub fn with_inputs(name: impl Into<String>, value: f64, inputs: Vec<ParticleKey>) -> Self {
        Self {
            name: name.into(),
            value,
            inputs,
        }
    }
}

impl Restraint for ConstantRestraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &mut self,
        _table: &mut EntityTable,
        _accum: Option<&DerivativeAccumulator>,
    ) -> Result<f64> {
        Ok(self.value)
    }

    fn input_particles(&self) -> Particles {
        SmallVec::from_slice(&self.inputs)
    }
}
