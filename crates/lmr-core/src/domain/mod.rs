pub mod errors;

pub use errors::{LmrError, LmrErrorCategory, LmrResult};

use serde::Serialize;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            _ => None,
        }
    }
}

/// Element counts along each axis. A zero `z` marks a planar (2D) mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Resolution {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Resolution {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub const fn is_planar(&self) -> bool {
        self.z == 0
    }

    pub const fn planar_cells(&self) -> u64 {
        self.x as u64 * self.y as u64
    }

    /// `64x64x0` style label used in output directory names.
    pub fn textual(&self) -> String {
        format!("{}x{}x{}", self.x, self.y, self.z)
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.textual())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dimensionality {
    Two,
    Three,
}

impl Dimensionality {
    pub const fn for_resolution(resolution: &Resolution) -> Self {
        if resolution.is_planar() {
            Self::Two
        } else {
            Self::Three
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Equilibration,
    Production,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equilibration => "thermal equilibration",
            Self::Production => "production",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Restart point requested by the job. `Auto` defers to the newest checkpoint
/// found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStep {
    #[default]
    Auto,
    Explicit(u32),
}
