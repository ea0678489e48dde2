//! Travel-time scale shared by the metric aggregator and the classifier.
//!
//! Reachability polygons come in fixed thresholds. A location outside every
//! polygon is [`Reachability::BeyondMaximum`], which orders strictly after
//! every real threshold and is rendered as [`BEYOND_MAXIMUM_MINUTES`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Upper bounds (inclusive, minutes) of the finite time bands.
pub const TIME_BAND_UPPER_BOUNDS: [u32; 5] = [5, 10, 15, 20, 30];

/// Largest threshold a reachability polygon may carry.
pub const MAX_THRESHOLD_MINUTES: u32 = 30;

/// Minutes reported for locations outside every reachability polygon.
pub const BEYOND_MAXIMUM_MINUTES: u32 = MAX_THRESHOLD_MINUTES + 1;

/// Default golden-hour threshold used to split acceptable from poor access.
pub const DEFAULT_GOLDEN_HOUR_MINUTES: u32 = 20;

/// Smallest reachability threshold containing a location.
///
/// Variant order matters: the derived [`Ord`] puts every `Within` before
/// `BeyondMaximum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u32", from = "u32")]
pub enum Reachability {
    /// Inside a polygon with this threshold (minutes).
    Within(u32),
    /// Outside every polygon.
    BeyondMaximum,
}

impl Reachability {
    /// Minutes on the continuous scale, with the sentinel rendered as
    /// [`BEYOND_MAXIMUM_MINUTES`].
    #[must_use]
    pub const fn minutes(self) -> u32 {
        match self {
            Self::Within(minutes) => minutes,
            Self::BeyondMaximum => BEYOND_MAXIMUM_MINUTES,
        }
    }

    /// Same as [`Self::minutes`] as a float for statistical use.
    #[must_use]
    pub fn minutes_f64(self) -> f64 {
        f64::from(self.minutes())
    }

    /// Ordered categorical band for this reachability.
    #[must_use]
    pub const fn band(self) -> TimeBand {
        TimeBand::from_minutes(self.minutes())
    }

    /// Whether the location is reachable within `threshold` minutes.
    #[must_use]
    pub const fn is_within(self, threshold: u32) -> bool {
        match self {
            Self::Within(minutes) => minutes <= threshold,
            Self::BeyondMaximum => false,
        }
    }
}

impl From<Reachability> for u32 {
    fn from(value: Reachability) -> Self {
        value.minutes()
    }
}

impl From<u32> for Reachability {
    fn from(minutes: u32) -> Self {
        if minutes > MAX_THRESHOLD_MINUTES {
            Self::BeyondMaximum
        } else {
            Self::Within(minutes)
        }
    }
}

/// Ordered categorical travel-time scale.
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
pub enum TimeBand {
    /// 0-5 minutes.
    #[serde(rename = "0-5 min")]
    #[strum(serialize = "0-5 min")]
    ZeroToFive,
    /// 5-10 minutes.
    #[serde(rename = "5-10 min")]
    #[strum(serialize = "5-10 min")]
    FiveToTen,
    /// 10-15 minutes.
    #[serde(rename = "10-15 min")]
    #[strum(serialize = "10-15 min")]
    TenToFifteen,
    /// 15-20 minutes.
    #[serde(rename = "15-20 min")]
    #[strum(serialize = "15-20 min")]
    FifteenToTwenty,
    /// 20-30 minutes.
    #[serde(rename = "20-30 min")]
    #[strum(serialize = "20-30 min")]
    TwentyToThirty,
    /// Beyond the largest threshold.
    #[serde(rename = "30+ min")]
    #[strum(serialize = "30+ min")]
    BeyondThirty,
}

impl TimeBand {
    /// Maps minutes to a band using the inclusive upper bounds in
    /// [`TIME_BAND_UPPER_BOUNDS`].
    #[must_use]
    pub const fn from_minutes(minutes: u32) -> Self {
        if minutes <= 5 {
            Self::ZeroToFive
        } else if minutes <= 10 {
            Self::FiveToTen
        } else if minutes <= 15 {
            Self::TenToFifteen
        } else if minutes <= 20 {
            Self::FifteenToTwenty
        } else if minutes <= 30 {
            Self::TwentyToThirty
        } else {
            Self::BeyondThirty
        }
    }

    /// Inclusive upper bound in minutes, `None` for the open-ended band.
    #[must_use]
    pub const fn upper_bound(self) -> Option<u32> {
        match self {
            Self::ZeroToFive => Some(TIME_BAND_UPPER_BOUNDS[0]),
            Self::FiveToTen => Some(TIME_BAND_UPPER_BOUNDS[1]),
            Self::TenToFifteen => Some(TIME_BAND_UPPER_BOUNDS[2]),
            Self::FifteenToTwenty => Some(TIME_BAND_UPPER_BOUNDS[3]),
            Self::TwentyToThirty => Some(TIME_BAND_UPPER_BOUNDS[4]),
            Self::BeyondThirty => None,
        }
    }

    /// Returns all bands in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ZeroToFive,
            Self::FiveToTen,
            Self::TenToFifteen,
            Self::FifteenToTwenty,
            Self::TwentyToThirty,
            Self::BeyondThirty,
        ]
    }
}
