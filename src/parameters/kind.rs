use crate::error::BoundsError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collision partner whose volume density enters the radiative-transfer model
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum CollisionPartner {
    #[serde(rename = "h2")]
    H2,
    #[serde(rename = "p-h2")]
    ParaH2,
    #[serde(rename = "o-h2")]
    OrthoH2,
    #[serde(rename = "e-")]
    Electron,
    #[serde(rename = "h")]
    H,
    #[serde(rename = "he")]
    He,
    #[serde(rename = "h+")]
    HPlus,
}

impl CollisionPartner {
    pub const ALL: [Self; 7] = [
        Self::H2,
        Self::ParaH2,
        Self::OrthoH2,
        Self::Electron,
        Self::H,
        Self::He,
        Self::HPlus,
    ];

    pub fn model_key(&self) -> &'static str {
        match self {
            Self::H2 => "h2",
            Self::ParaH2 => "p-h2",
            Self::OrthoH2 => "o-h2",
            Self::Electron => "e-",
            Self::H => "h",
            Self::He => "he",
            Self::HPlus => "h+",
        }
    }
}

/// Physical quantity that can either be fit or held fixed
///
/// The derived ordering is the canonical fit order: kinetic temperature, column density and then
/// the collision-partner densities in the order of [CollisionPartner::ALL].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum PhysicalParameter {
    KineticTemperature,
    ColumnDensity,
    Density(CollisionPartner),
}

impl PhysicalParameter {
    /// Key understood by the forward model
    pub fn model_key(&self) -> &'static str {
        match self {
            Self::KineticTemperature => "tkin",
            Self::ColumnDensity => "cdmol",
            Self::Density(partner) => partner.model_key(),
        }
    }

    /// Range the forward model is able to operate in, both ends excluded
    pub fn operating_range(&self) -> OperatingRange {
        match self {
            Self::KineticTemperature => OperatingRange::new(0.1, 1e4),
            Self::ColumnDensity => OperatingRange::new(1e5, 1e25),
            Self::Density(_) => OperatingRange::new(1e-3, 1e13),
        }
    }

    /// How the grid stage spaces candidate values of this parameter
    pub fn spacing(&self) -> AxisSpacing {
        match self {
            Self::KineticTemperature => AxisSpacing::Linear,
            Self::ColumnDensity | Self::Density(_) => AxisSpacing::Geometric,
        }
    }
}

impl fmt::Display for PhysicalParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisSpacing {
    Linear,
    Geometric,
}

/// Cloud geometry used by the escape probability of the forward model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Geometry {
    #[default]
    UniformSphere,
    Lvg,
    Slab,
}

impl Geometry {
    pub fn model_code(&self) -> u8 {
        match self {
            Self::UniformSphere => 1,
            Self::Lvg => 2,
            Self::Slab => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UniformSphere => "uniform sphere",
            Self::Lvg => "LVG",
            Self::Slab => "slab",
        }
    }
}

/// Open interval of values accepted by the forward model
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperatingRange {
    pub min: f64,
    pub max: f64,
}

impl OperatingRange {
    pub const BACKGROUND_TEMPERATURE: Self = Self::new(-1e4, 1e4);
    pub const LINE_WIDTH: Self = Self::new(1e-3, 1e3);
    pub const FREQUENCY: Self = Self::new(0.0, 3e7);

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min < value && value < self.max
    }

    pub fn check(&self, name: impl Into<String>, value: f64) -> Result<(), BoundsError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(BoundsError::OutOfRange {
                parameter: name.into(),
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}
