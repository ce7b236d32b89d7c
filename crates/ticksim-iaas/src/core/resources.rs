//! Multi-dimensional resource amounts.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing resource amounts.
pub const EPSILON: f64 = 1e-9;

/// Amount of resources in every dimension tracked by the simulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// Processing power.
    pub cpu: f64,
    /// Memory.
    pub memory: f64,
}

impl Resources {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self { cpu, memory }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Checks whether this amount fits into `available` in every dimension.
    pub fn fits_into(&self, available: &Resources) -> bool {
        self.cpu <= available.cpu + EPSILON && self.memory <= available.memory + EPSILON
    }

    /// Checks whether some dimension is below zero.
    pub fn is_negative(&self) -> bool {
        self.cpu < -EPSILON || self.memory < -EPSILON
    }

    /// Checks whether every dimension is (almost) zero.
    pub fn is_zero(&self) -> bool {
        self.cpu.abs() <= EPSILON && self.memory.abs() <= EPSILON
    }

    /// Returns the smallest ratio between this amount and `total` over all dimensions.
    ///
    /// Dimensions with zero total are ignored.
    pub fn min_ratio_to(&self, total: &Resources) -> f64 {
        let mut ratio = f64::INFINITY;
        if total.cpu > 0. {
            ratio = ratio.min(self.cpu / total.cpu);
        }
        if total.memory > 0. {
            ratio = ratio.min(self.memory / total.memory);
        }
        if ratio.is_infinite() {
            0.
        } else {
            ratio
        }
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, other: Resources) -> Resources {
        Resources::new(self.cpu + other.cpu, self.memory + other.memory)
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, other: Resources) -> Resources {
        Resources::new(self.cpu - other.cpu, self.memory - other.memory)
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, other: Resources) {
        self.cpu += other.cpu;
        self.memory += other.memory;
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, other: Resources) {
        self.cpu -= other.cpu;
        self.memory -= other.memory;
    }
}

impl std::fmt::Display for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "cpu = {}, memory = {}", self.cpu, self.memory)
    }
}
