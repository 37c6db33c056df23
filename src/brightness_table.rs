/// Brightness table
///
/// Maps an ambient light reading (lux) to a monitor brightness percentage using an ordered list of
/// half-open `[min, max)` bands. Bands may overlap: the first band in declaration order that
/// contains the value wins.
use serde::Deserialize;

use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Band {
    pub min: i64,
    pub max: i64,
    pub percentage: u16,
}

impl Band {
    pub const fn new(min: i64, max: i64, percentage: u16) -> Self {
        Band {
            min,
            max,
            percentage,
        }
    }

    pub fn contains(&self, lux: i64) -> bool {
        self.min <= lux && lux < self.max
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) -> {}%", self.min, self.max, self.percentage)
    }
}

// based on https://learn.microsoft.com/en-us/windows-hardware/design/device-experiences/sensors-adaptive-brightness#ambient-light-response-curve-changes-for-windows-11
pub const DEFAULT_BANDS: &[Band] = &[
    Band::new(0, 10, 10),
    Band::new(5, 50, 25),
    Band::new(15, 100, 40),
    Band::new(60, 300, 55),
    Band::new(150, 400, 70),
    Band::new(250, 650, 85),
    Band::new(350, 2000, 100),
    Band::new(1000, 7000, 115),
    Band::new(5000, 10000, 130),
];

/// Brightness percentage for `lux`, or 0 when no band contains it.
pub fn percentage_for(bands: &[Band], lux: i64) -> u16 {
    bands
        .iter()
        .find(|b| b.contains(lux))
        .map_or(0, |b| b.percentage)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrightnessTable {
    bands: Cow<'static, [Band]>,
}

impl Default for BrightnessTable {
    fn default() -> Self {
        BrightnessTable {
            bands: Cow::Borrowed(DEFAULT_BANDS),
        }
    }
}

impl BrightnessTable {
    /// Build a table from bands in the order they should be matched.
    ///
    /// The order is kept as given: overlapping bands are never sorted or merged, since that would
    /// change which band wins.
    pub fn from_bands(bands: Vec<Band>) -> Self {
        BrightnessTable {
            bands: Cow::Owned(bands),
        }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn percentage_for(&self, lux: i64) -> u16 {
        percentage_for(&self.bands, lux)
    }
}
