//! Tercile and bivariate class taxonomy.
//!
//! The 3x3 bivariate scheme crosses a density tercile with a travel-time
//! tercile. Class `9` (high burden, poor access) is the highest-priority
//! category. The label and priority tables below are fixed and shared by
//! every consumer of the classification.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One of three equal-sized rank groups of a ranked distribution.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Tercile {
    /// Lowest third of the ranking.
    Low = 1,
    /// Middle third of the ranking.
    Medium = 2,
    /// Highest third of the ranking.
    High = 3,
}

impl Tercile {
    /// Returns the numeric value of this tercile (1-3).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a tercile from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-3.
    pub const fn from_value(value: u8) -> Result<Self, InvalidTercileError> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            _ => Err(InvalidTercileError { value }),
        }
    }

    /// Returns all variants in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Low, Self::Medium, Self::High]
    }
}

impl From<Tercile> for u8 {
    fn from(value: Tercile) -> Self {
        value.value()
    }
}

impl TryFrom<u8> for Tercile {
    type Error = InvalidTercileError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Error returned when a numeric value is not a valid [`Tercile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTercileError {
    /// The invalid tercile value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidTercileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid tercile value {}: expected 1-3", self.value)
    }
}

impl std::error::Error for InvalidTercileError {}

/// Policy grouping of the nine bivariate classes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PriorityGroup {
    /// Class 9: high burden and poor access.
    Highest,
    /// Classes 7 and 8: high burden, acceptable access.
    ViolenceDominant,
    /// Classes 3 and 6: poor access without high burden.
    AccessDominant,
    /// Classes 4 and 5.
    Moderate,
    /// Classes 1 and 2.
    Lowest,
}

/// Label and priority group per class, indexed by `class - 1`.
const CLASS_TABLE: [(&str, PriorityGroup); 9] = [
    ("Low burden, good access", PriorityGroup::Lowest),
    ("Low burden, moderate access", PriorityGroup::Lowest),
    ("Low burden, poor access", PriorityGroup::AccessDominant),
    ("Moderate burden, good access", PriorityGroup::Moderate),
    ("Moderate burden, moderate access", PriorityGroup::Moderate),
    ("Moderate burden, poor access", PriorityGroup::AccessDominant),
    ("High burden, good access", PriorityGroup::ViolenceDominant),
    ("High burden, moderate access", PriorityGroup::ViolenceDominant),
    ("Highest priority", PriorityGroup::Highest),
];

/// A 1-9 bivariate category, `(density_tercile - 1) * 3 + time_tercile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct BivariateClass(u8);

impl BivariateClass {
    /// The designated highest-risk class.
    pub const HIGHEST: Self = Self(9);

    /// Composes the class from a density tercile and a time tercile.
    #[must_use]
    pub const fn from_terciles(density: Tercile, time: Tercile) -> Self {
        Self((density.value() - 1) * 3 + time.value())
    }

    /// Creates a class from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-9.
    pub const fn new(value: u8) -> Result<Self, InvalidClassError> {
        if value >= 1 && value <= 9 {
            Ok(Self(value))
        } else {
            Err(InvalidClassError { value })
        }
    }

    /// Returns the numeric value (1-9).
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the density tercile this class was composed from.
    #[must_use]
    pub const fn density_tercile(self) -> Tercile {
        match (self.0 - 1) / 3 {
            0 => Tercile::Low,
            1 => Tercile::Medium,
            _ => Tercile::High,
        }
    }

    /// Returns the time tercile this class was composed from.
    #[must_use]
    pub const fn time_tercile(self) -> Tercile {
        match (self.0 - 1) % 3 {
            0 => Tercile::Low,
            1 => Tercile::Medium,
            _ => Tercile::High,
        }
    }

    /// Human-readable label from the fixed lookup table.
    #[must_use]
    pub const fn label(self) -> &'static str {
        CLASS_TABLE[(self.0 - 1) as usize].0
    }

    /// Priority group from the fixed lookup table.
    #[must_use]
    pub const fn priority(self) -> PriorityGroup {
        CLASS_TABLE[(self.0 - 1) as usize].1
    }

    /// Whether this is class 9.
    #[must_use]
    pub const fn is_highest_priority(self) -> bool {
        self.0 == Self::HIGHEST.0
    }

    /// Returns all nine classes in ascending order.
    #[must_use]
    pub fn all() -> Vec<Self> {
        (1..=9).map(Self).collect()
    }
}

impl From<BivariateClass> for u8 {
    fn from(value: BivariateClass) -> Self {
        value.0
    }
}

impl TryFrom<u8> for BivariateClass {
    type Error = InvalidClassError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for BivariateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a numeric value is not a valid [`BivariateClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidClassError {
    /// The invalid class value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidClassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid bivariate class {}: expected 1-9", self.value)
    }
}

impl std::error::Error for InvalidClassError {}
