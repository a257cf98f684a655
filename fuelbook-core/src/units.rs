//! Display units and their conversion to the canonical storage units.
//!
//! Everything persisted by the archive is kept in kilometres, litres and
//! currency per litre. The enums below convert user-facing values at the
//! boundary and carry a stable integer id for storage.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn kilometers_per_statute_mile() -> Decimal {
    Decimal::new(1_609_344, 6)
}

fn liters_per_us_gallon() -> Decimal {
    Decimal::new(3_785_411_784, 9)
}

fn liters_per_imperial_gallon() -> Decimal {
    Decimal::new(454_609, 5)
}

/// Unit used for odometer readings and trip distances.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[default]
    #[serde(rename = "km", alias = "kilometers")]
    Kilometers,
    #[serde(rename = "mi", alias = "miles")]
    StatuteMiles,
}

impl DistanceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Kilometers => "km",
            DistanceUnit::StatuteMiles => "mi",
        }
    }

    pub fn persistent_id(self) -> i32 {
        match self {
            DistanceUnit::Kilometers => 0,
            DistanceUnit::StatuteMiles => 1,
        }
    }

    pub fn from_persistent_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(DistanceUnit::Kilometers),
            1 => Some(DistanceUnit::StatuteMiles),
            _ => None,
        }
    }

    pub fn is_metric(self) -> bool {
        matches!(self, DistanceUnit::Kilometers)
    }

    /// Kilometres covered by one unit.
    pub fn kilometers_per_unit(self) -> Decimal {
        match self {
            DistanceUnit::Kilometers => Decimal::ONE,
            DistanceUnit::StatuteMiles => kilometers_per_statute_mile(),
        }
    }

    pub fn to_kilometers(self, distance: Decimal) -> Decimal {
        match self {
            DistanceUnit::Kilometers => distance,
            other => distance * other.kilometers_per_unit(),
        }
    }

    pub fn from_kilometers(self, kilometers: Decimal) -> Decimal {
        match self {
            DistanceUnit::Kilometers => kilometers,
            other => kilometers / other.kilometers_per_unit(),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "km" | "kilometers" | "kilometres" => Ok(DistanceUnit::Kilometers),
            "mi" | "miles" => Ok(DistanceUnit::StatuteMiles),
            other => Err(format!("unknown distance unit: {other}")),
        }
    }
}

/// Unit used for fuel volumes and the denominator of fuel prices.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[default]
    #[serde(rename = "l", alias = "liters")]
    Liters,
    #[serde(rename = "gal", alias = "gallons-us")]
    GallonsUs,
    #[serde(rename = "imp-gal", alias = "gallons-imperial")]
    GallonsImperial,
}

impl VolumeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            VolumeUnit::Liters => "l",
            VolumeUnit::GallonsUs => "gal",
            VolumeUnit::GallonsImperial => "imp-gal",
        }
    }

    pub fn persistent_id(self) -> i32 {
        match self {
            VolumeUnit::Liters => 0,
            VolumeUnit::GallonsUs => 1,
            VolumeUnit::GallonsImperial => 2,
        }
    }

    pub fn from_persistent_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(VolumeUnit::Liters),
            1 => Some(VolumeUnit::GallonsUs),
            2 => Some(VolumeUnit::GallonsImperial),
            _ => None,
        }
    }

    pub fn is_metric(self) -> bool {
        matches!(self, VolumeUnit::Liters)
    }

    /// Litres contained in one unit.
    pub fn liters_per_unit(self) -> Decimal {
        match self {
            VolumeUnit::Liters => Decimal::ONE,
            VolumeUnit::GallonsUs => liters_per_us_gallon(),
            VolumeUnit::GallonsImperial => liters_per_imperial_gallon(),
        }
    }

    pub fn to_liters(self, volume: Decimal) -> Decimal {
        match self {
            VolumeUnit::Liters => volume,
            other => volume * other.liters_per_unit(),
        }
    }

    pub fn from_liters(self, liters: Decimal) -> Decimal {
        match self {
            VolumeUnit::Liters => liters,
            other => liters / other.liters_per_unit(),
        }
    }

    /// Converts a price quoted per unit into a price per litre.
    pub fn price_per_liter(self, price: Decimal) -> Decimal {
        match self {
            VolumeUnit::Liters => price,
            other => price / other.liters_per_unit(),
        }
    }

    /// Converts a price per litre back into a price per unit.
    pub fn price_per_unit(self, price_per_liter: Decimal) -> Decimal {
        match self {
            VolumeUnit::Liters => price_per_liter,
            other => price_per_liter * other.liters_per_unit(),
        }
    }
}

impl fmt::Display for VolumeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "liters" | "litres" => Ok(VolumeUnit::Liters),
            "gal" | "gallons-us" | "us-gal" => Ok(VolumeUnit::GallonsUs),
            "imp-gal" | "gallons-imperial" => Ok(VolumeUnit::GallonsImperial),
            other => Err(format!("unknown volume unit: {other}")),
        }
    }
}

/// Unit used to express fuel consumption.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ConsumptionUnit {
    #[default]
    #[serde(rename = "l/100km")]
    LitersPer100Km,
    #[serde(rename = "km/l")]
    KilometersPerLiter,
    #[serde(rename = "mpg")]
    MilesPerGallonUs,
    #[serde(rename = "mpg-imp")]
    MilesPerGallonImperial,
    #[serde(rename = "gp10k")]
    GallonsPer10kMilesUs,
    #[serde(rename = "gp10k-imp")]
    GallonsPer10kMilesImperial,
}

impl ConsumptionUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsumptionUnit::LitersPer100Km => "l/100km",
            ConsumptionUnit::KilometersPerLiter => "km/l",
            ConsumptionUnit::MilesPerGallonUs => "mpg",
            ConsumptionUnit::MilesPerGallonImperial => "mpg-imp",
            ConsumptionUnit::GallonsPer10kMilesUs => "gp10k",
            ConsumptionUnit::GallonsPer10kMilesImperial => "gp10k-imp",
        }
    }

    pub fn persistent_id(self) -> i32 {
        match self {
            ConsumptionUnit::LitersPer100Km => 0,
            ConsumptionUnit::KilometersPerLiter => 1,
            ConsumptionUnit::MilesPerGallonUs => 2,
            ConsumptionUnit::MilesPerGallonImperial => 3,
            ConsumptionUnit::GallonsPer10kMilesUs => 4,
            ConsumptionUnit::GallonsPer10kMilesImperial => 5,
        }
    }

    pub fn from_persistent_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(ConsumptionUnit::LitersPer100Km),
            1 => Some(ConsumptionUnit::KilometersPerLiter),
            2 => Some(ConsumptionUnit::MilesPerGallonUs),
            3 => Some(ConsumptionUnit::MilesPerGallonImperial),
            4 => Some(ConsumptionUnit::GallonsPer10kMilesUs),
            5 => Some(ConsumptionUnit::GallonsPer10kMilesImperial),
            _ => None,
        }
    }

    /// Whether larger values mean a more economical vehicle.
    pub fn is_efficiency(self) -> bool {
        matches!(
            self,
            ConsumptionUnit::KilometersPerLiter
                | ConsumptionUnit::MilesPerGallonUs
                | ConsumptionUnit::MilesPerGallonImperial
        )
    }

    /// Express the consumption of `liters` over `kilometers` in this unit.
    ///
    /// Returns `None` when the ratio is undefined (zero distance for
    /// volume-per-distance units, zero volume for distance-per-volume units)
    /// or too large to represent.
    pub fn consumption(self, kilometers: Decimal, liters: Decimal) -> Option<Decimal> {
        let hundred = Decimal::ONE_HUNDRED;
        let ten_thousand = Decimal::from(10_000);
        match self {
            ConsumptionUnit::LitersPer100Km => liters
                .checked_mul(hundred)?
                .checked_div(non_zero(kilometers)?),
            ConsumptionUnit::KilometersPerLiter => kilometers.checked_div(non_zero(liters)?),
            ConsumptionUnit::MilesPerGallonUs => kilometers
                .checked_mul(liters_per_us_gallon())?
                .checked_div(kilometers_per_statute_mile().checked_mul(non_zero(liters)?)?),
            ConsumptionUnit::MilesPerGallonImperial => kilometers
                .checked_mul(liters_per_imperial_gallon())?
                .checked_div(kilometers_per_statute_mile().checked_mul(non_zero(liters)?)?),
            ConsumptionUnit::GallonsPer10kMilesUs => liters
                .checked_mul(kilometers_per_statute_mile())?
                .checked_mul(ten_thousand)?
                .checked_div(liters_per_us_gallon().checked_mul(non_zero(kilometers)?)?),
            ConsumptionUnit::GallonsPer10kMilesImperial => liters
                .checked_mul(kilometers_per_statute_mile())?
                .checked_mul(ten_thousand)?
                .checked_div(liters_per_imperial_gallon().checked_mul(non_zero(kilometers)?)?),
        }
    }
}

fn non_zero(value: Decimal) -> Option<Decimal> {
    (!value.is_zero()).then_some(value)
}

impl fmt::Display for ConsumptionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumptionUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l/100km" => Ok(ConsumptionUnit::LitersPer100Km),
            "km/l" => Ok(ConsumptionUnit::KilometersPerLiter),
            "mpg" | "mpg-us" => Ok(ConsumptionUnit::MilesPerGallonUs),
            "mpg-imp" => Ok(ConsumptionUnit::MilesPerGallonImperial),
            "gp10k" | "gp10k-us" => Ok(ConsumptionUnit::GallonsPer10kMilesUs),
            "gp10k-imp" => Ok(ConsumptionUnit::GallonsPer10kMilesImperial),
            other => Err(format!("unknown consumption unit: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn miles_convert_exactly() {
        assert_eq!(DistanceUnit::StatuteMiles.to_kilometers(dec!(100)), dec!(160.9344));
        assert_eq!(
            DistanceUnit::StatuteMiles.from_kilometers(dec!(160.9344)),
            dec!(100)
        );
    }

    #[test]
    fn gallon_prices_normalize_to_liters() {
        let per_gallon = dec!(3.785411784);
        assert_eq!(VolumeUnit::GallonsUs.price_per_liter(per_gallon), dec!(1));
        assert_eq!(VolumeUnit::GallonsUs.price_per_unit(dec!(1)), per_gallon);
    }

    #[test]
    fn consumption_in_liters_per_100km() {
        let value = ConsumptionUnit::LitersPer100Km
            .consumption(dec!(500), dec!(40))
            .unwrap();
        assert_eq!(value, dec!(8));
        assert!(ConsumptionUnit::LitersPer100Km
            .consumption(Decimal::ZERO, dec!(40))
            .is_none());
    }

    #[test]
    fn consumption_in_mpg() {
        // 100 miles on 4 US gallons
        let kilometers = dec!(160.9344);
        let liters = dec!(15.141647136);
        let mpg = ConsumptionUnit::MilesPerGallonUs
            .consumption(kilometers, liters)
            .unwrap();
        assert_eq!(mpg, dec!(25));
        let gp10k = ConsumptionUnit::GallonsPer10kMilesUs
            .consumption(kilometers, liters)
            .unwrap();
        assert_eq!(gp10k, dec!(400));
    }

    #[test]
    fn unrepresentable_consumption_is_none() {
        assert!(ConsumptionUnit::LitersPer100Km
            .consumption(dec!(1), Decimal::MAX)
            .is_none());
        assert!(ConsumptionUnit::GallonsPer10kMilesUs
            .consumption(dec!(1), Decimal::MAX)
            .is_none());
    }

    #[test]
    fn parses_short_forms() {
        assert_eq!("mi".parse::<DistanceUnit>().unwrap(), DistanceUnit::StatuteMiles);
        assert_eq!("imp-gal".parse::<VolumeUnit>().unwrap(), VolumeUnit::GallonsImperial);
        assert_eq!(
            "L/100km".parse::<ConsumptionUnit>().unwrap(),
            ConsumptionUnit::LitersPer100Km
        );
        assert!("furlong".parse::<DistanceUnit>().is_err());
    }

    #[test]
    fn persistent_ids_are_stable() {
        for unit in [
            ConsumptionUnit::LitersPer100Km,
            ConsumptionUnit::KilometersPerLiter,
            ConsumptionUnit::MilesPerGallonUs,
            ConsumptionUnit::MilesPerGallonImperial,
            ConsumptionUnit::GallonsPer10kMilesUs,
            ConsumptionUnit::GallonsPer10kMilesImperial,
        ] {
            assert_eq!(
                ConsumptionUnit::from_persistent_id(unit.persistent_id()),
                Some(unit)
            );
        }
        assert_eq!(VolumeUnit::from_persistent_id(9), None);
    }

    #[test]
    fn serde_uses_short_names_and_accepts_long_aliases() {
        assert_eq!(
            serde_json::to_string(&ConsumptionUnit::MilesPerGallonImperial).unwrap(),
            "\"mpg-imp\""
        );
        let unit: DistanceUnit = serde_json::from_str("\"miles\"").unwrap();
        assert_eq!(unit, DistanceUnit::StatuteMiles);
    }
}
