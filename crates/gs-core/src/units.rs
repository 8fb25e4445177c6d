// gs-core/src/units.rs

use core::fmt;
use core::str::FromStr;

use uom::si::f64::{
    Angle as UomAngle, ElectricCurrent as UomCurrent, ElectricPotential as UomPotential,
    Frequency as UomFrequency, Power as UomPower, Time as UomTime,
};

/// Unit tag attached to a parameter assignment.
///
/// `Default` means "whatever the receiving field natively uses" and is never
/// converted. `PerUnit` values are only compatible with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Unit {
    #[default]
    Default,
    PerUnit,
    Second,
    Millisecond,
    Minute,
    Volt,
    Kilovolt,
    Ampere,
    Kiloampere,
    Watt,
    Kilowatt,
    Megawatt,
    Hertz,
    Radian,
    Degree,
}

/// Physical dimension of a unit tag; conversions only happen within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    None,
    PerUnit,
    Time,
    Voltage,
    Current,
    Power,
    Frequency,
    Angle,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Default => Dimension::None,
            Unit::PerUnit => Dimension::PerUnit,
            Unit::Second | Unit::Millisecond | Unit::Minute => Dimension::Time,
            Unit::Volt | Unit::Kilovolt => Dimension::Voltage,
            Unit::Ampere | Unit::Kiloampere => Dimension::Current,
            Unit::Watt | Unit::Kilowatt | Unit::Megawatt => Dimension::Power,
            Unit::Hertz => Dimension::Frequency,
            Unit::Radian | Unit::Degree => Dimension::Angle,
        }
    }

    /// Express `value` (given in this unit) in the SI base unit of its dimension.
    fn to_base(self, value: f64) -> f64 {
        use uom::si::{angle, electric_current, electric_potential, frequency, power, time};
        match self {
            Unit::Default | Unit::PerUnit => value,
            Unit::Second => UomTime::new::<time::second>(value).get::<time::second>(),
            Unit::Millisecond => UomTime::new::<time::millisecond>(value).get::<time::second>(),
            Unit::Minute => UomTime::new::<time::minute>(value).get::<time::second>(),
            Unit::Volt => UomPotential::new::<electric_potential::volt>(value)
                .get::<electric_potential::volt>(),
            Unit::Kilovolt => UomPotential::new::<electric_potential::kilovolt>(value)
                .get::<electric_potential::volt>(),
            Unit::Ampere => UomCurrent::new::<electric_current::ampere>(value)
                .get::<electric_current::ampere>(),
            Unit::Kiloampere => UomCurrent::new::<electric_current::kiloampere>(value)
                .get::<electric_current::ampere>(),
            Unit::Watt => UomPower::new::<power::watt>(value).get::<power::watt>(),
            Unit::Kilowatt => UomPower::new::<power::kilowatt>(value).get::<power::watt>(),
            Unit::Megawatt => UomPower::new::<power::megawatt>(value).get::<power::watt>(),
            Unit::Hertz => UomFrequency::new::<frequency::hertz>(value).get::<frequency::hertz>(),
            Unit::Radian => UomAngle::new::<angle::radian>(value).get::<angle::radian>(),
            Unit::Degree => UomAngle::new::<angle::degree>(value).get::<angle::radian>(),
        }
    }

    /// Inverse of [`Unit::to_base`].
    fn from_base(self, value: f64) -> f64 {
        use uom::si::{angle, electric_current, electric_potential, frequency, power, time};
        match self {
            Unit::Default | Unit::PerUnit => value,
            Unit::Second => UomTime::new::<time::second>(value).get::<time::second>(),
            Unit::Millisecond => UomTime::new::<time::second>(value).get::<time::millisecond>(),
            Unit::Minute => UomTime::new::<time::second>(value).get::<time::minute>(),
            Unit::Volt => UomPotential::new::<electric_potential::volt>(value)
                .get::<electric_potential::volt>(),
            Unit::Kilovolt => UomPotential::new::<electric_potential::volt>(value)
                .get::<electric_potential::kilovolt>(),
            Unit::Ampere => UomCurrent::new::<electric_current::ampere>(value)
                .get::<electric_current::ampere>(),
            Unit::Kiloampere => UomCurrent::new::<electric_current::ampere>(value)
                .get::<electric_current::kiloampere>(),
            Unit::Watt => UomPower::new::<power::watt>(value).get::<power::watt>(),
            Unit::Kilowatt => UomPower::new::<power::watt>(value).get::<power::kilowatt>(),
            Unit::Megawatt => UomPower::new::<power::watt>(value).get::<power::megawatt>(),
            Unit::Hertz => UomFrequency::new::<frequency::hertz>(value).get::<frequency::hertz>(),
            Unit::Radian => UomAngle::new::<angle::radian>(value).get::<angle::radian>(),
            Unit::Degree => UomAngle::new::<angle::radian>(value).get::<angle::degree>(),
        }
    }

    /// Short label used in event descriptions, e.g. `ms` or `kV`.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Default => "",
            Unit::PerUnit => "pu",
            Unit::Second => "s",
            Unit::Millisecond => "ms",
            Unit::Minute => "min",
            Unit::Volt => "V",
            Unit::Kilovolt => "kV",
            Unit::Ampere => "A",
            Unit::Kiloampere => "kA",
            Unit::Watt => "W",
            Unit::Kilowatt => "kW",
            Unit::Megawatt => "MW",
            Unit::Hertz => "Hz",
            Unit::Radian => "rad",
            Unit::Degree => "deg",
        }
    }
}

/// Convert `value` from one unit tag to another.
///
/// Returns `None` when the dimensions differ. `Unit::Default` on either side
/// passes the value through untouched.
pub fn convert(value: f64, from: Unit, to: Unit) -> Option<f64> {
    if from == to || from == Unit::Default || to == Unit::Default {
        return Some(value);
    }
    if from.dimension() != to.dimension() {
        return None;
    }
    Some(to.from_base(from.to_base(value)))
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = crate::GsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Unit::Default,
            "pu" | "perunit" => Unit::PerUnit,
            "s" | "sec" | "second" | "seconds" => Unit::Second,
            "ms" | "millisecond" | "milliseconds" => Unit::Millisecond,
            "min" | "minute" | "minutes" => Unit::Minute,
            "v" | "volt" | "volts" => Unit::Volt,
            "kv" | "kilovolt" | "kilovolts" => Unit::Kilovolt,
            "a" | "amp" | "ampere" | "amps" => Unit::Ampere,
            "ka" | "kiloampere" => Unit::Kiloampere,
            "w" | "watt" | "watts" => Unit::Watt,
            "kw" | "kilowatt" => Unit::Kilowatt,
            "mw" | "megawatt" => Unit::Megawatt,
            "hz" | "hertz" => Unit::Hertz,
            "rad" | "radian" | "radians" => Unit::Radian,
            "deg" | "degree" | "degrees" => Unit::Degree,
            _ => {
                return Err(crate::GsError::InvalidArg {
                    what: "unrecognized unit",
                });
            }
        };
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_to_seconds() {
        let v = convert(250.0, Unit::Millisecond, Unit::Second).unwrap();
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn degrees_to_radians() {
        let v = convert(180.0, Unit::Degree, Unit::Radian).unwrap();
        assert!((v - core::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn megawatt_to_kilowatt() {
        let v = convert(1.5, Unit::Megawatt, Unit::Kilowatt).unwrap();
        assert!((v - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn incompatible_dimensions_refuse() {
        assert!(convert(1.0, Unit::Volt, Unit::Second).is_none());
        assert!(convert(1.0, Unit::PerUnit, Unit::Volt).is_none());
    }

    #[test]
    fn default_passes_through() {
        assert_eq!(convert(3.0, Unit::Default, Unit::Kilovolt), Some(3.0));
        assert_eq!(convert(3.0, Unit::Kilovolt, Unit::Default), Some(3.0));
    }

    #[test]
    fn parse_round_trip() {
        for unit in [Unit::Millisecond, Unit::Kilovolt, Unit::Megawatt, Unit::Degree] {
            let parsed: Unit = unit.symbol().parse().unwrap();
            assert_eq!(parsed, unit);
        }
        assert!("furlong".parse::<Unit>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn kilovolt_conversion_inverts(v in -1e6f64..1e6) {
            let volts = convert(v, Unit::Kilovolt, Unit::Volt).unwrap();
            let back = convert(volts, Unit::Volt, Unit::Kilovolt).unwrap();
            proptest::prop_assert!((back - v).abs() <= 1e-9 * v.abs().max(1.0));
        }
    }
}
