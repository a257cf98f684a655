//! Consumption and cost statistics derived from stored fill-ups.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ConsumptionUnit, DistanceUnit, FuelEvent};

/// Consumption attributed to a full fill-up, including the partial run it closes.
///
/// Partial fill-ups have no consumption of their own: their distance and
/// volume are accounted for at the next full fill-up.
pub fn fill_up_consumption(event: &FuelEvent, unit: ConsumptionUnit) -> Option<Decimal> {
    if !event.filled_up {
        return None;
    }
    unit.consumption(event.total_distance(), event.total_fuel_volume())
}

/// Start of a statistics window covering the last `months` months before `now`.
///
/// `0` selects the whole history.
pub fn window_start(months: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if months == 0 {
        return None;
    }
    now.checked_sub_months(Months::new(months))
}

/// Aggregate figures over a set of fill-ups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelStatistics {
    pub unit: ConsumptionUnit,
    pub fill_ups: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub total_cost: Decimal,
    pub total_distance: Decimal,
    pub total_fuel_volume: Decimal,
    pub average_consumption: Option<Decimal>,
    pub best_consumption: Option<Decimal>,
    pub worst_consumption: Option<Decimal>,
    pub average_price_per_liter: Option<Decimal>,
}

impl FuelStatistics {
    pub fn from_events(events: &[FuelEvent], unit: ConsumptionUnit) -> Self {
        let mut stats = FuelStatistics {
            unit,
            ..FuelStatistics::default()
        };
        let mut closed_distance = Decimal::ZERO;
        let mut closed_volume = Decimal::ZERO;
        for event in events {
            stats.fill_ups += 1;
            let cost = event.cost().unwrap_or(Decimal::MAX);
            stats.total_cost = stats.total_cost.saturating_add(cost);
            stats.total_distance = stats.total_distance.saturating_add(event.distance);
            stats.total_fuel_volume = stats.total_fuel_volume.saturating_add(event.fuel_volume);
            stats.first = Some(stats.first.map_or(event.timestamp, |t| t.min(event.timestamp)));
            stats.last = Some(stats.last.map_or(event.timestamp, |t| t.max(event.timestamp)));

            let Some(consumption) = fill_up_consumption(event, unit) else {
                continue;
            };
            closed_distance = closed_distance.saturating_add(event.total_distance());
            closed_volume = closed_volume.saturating_add(event.total_fuel_volume());
            stats.best_consumption = Some(match stats.best_consumption {
                Some(best) => pick(best, consumption, unit.is_efficiency()),
                None => consumption,
            });
            stats.worst_consumption = Some(match stats.worst_consumption {
                Some(worst) => pick(worst, consumption, !unit.is_efficiency()),
                None => consumption,
            });
        }
        stats.average_consumption = unit.consumption(closed_distance, closed_volume);
        if !stats.total_fuel_volume.is_zero() {
            stats.average_price_per_liter = stats.total_cost.checked_div(stats.total_fuel_volume);
        }
        stats
    }

    /// Money spent per one `unit` of distance driven.
    pub fn cost_per_distance(&self, unit: DistanceUnit) -> Option<Decimal> {
        if self.total_distance.is_zero() {
            return None;
        }
        let distance = unit.from_kilometers(self.total_distance);
        self.total_cost.checked_div(distance)
    }
}

fn pick(current: Decimal, candidate: Decimal, prefer_larger: bool) -> Decimal {
    if prefer_larger {
        current.max(candidate)
    } else {
        current.min(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventId, VehicleId};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn event(
        day: i64,
        distance: Decimal,
        price: Decimal,
        fuel_volume: Decimal,
        filled_up: bool,
        inherited: (Decimal, Decimal, Decimal),
    ) -> FuelEvent {
        FuelEvent {
            id: EventId::new(),
            vehicle_id: VehicleId::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + Duration::days(day),
            distance,
            price,
            fuel_volume,
            filled_up,
            comment: None,
            inherited_cost: inherited.0,
            inherited_distance: inherited.1,
            inherited_fuel_volume: inherited.2,
        }
    }

    #[test]
    fn partial_fill_ups_have_no_consumption() {
        let zero = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let partial = event(0, dec!(300), dec!(1.6), dec!(25), false, zero);
        assert_eq!(
            fill_up_consumption(&partial, ConsumptionUnit::LitersPer100Km),
            None
        );
    }

    #[test]
    fn full_fill_up_includes_inherited_run() {
        let full = event(
            1,
            dec!(200),
            dec!(1.55),
            dec!(15),
            true,
            (dec!(40), dec!(300), dec!(25)),
        );
        assert_eq!(
            fill_up_consumption(&full, ConsumptionUnit::LitersPer100Km),
            Some(dec!(8))
        );
    }

    #[test]
    fn aggregates_over_history() {
        let zero = (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
        let events = vec![
            event(0, dec!(500), dec!(1.5), dec!(40), true, zero),
            event(1, dec!(300), dec!(1.6), dec!(25), false, zero),
            event(2, dec!(200), dec!(1.55), dec!(15), true, (dec!(40), dec!(300), dec!(25))),
        ];
        let stats = FuelStatistics::from_events(&events, ConsumptionUnit::LitersPer100Km);
        assert_eq!(stats.fill_ups, 3);
        assert_eq!(stats.total_distance, dec!(1000));
        assert_eq!(stats.total_fuel_volume, dec!(80));
        assert_eq!(stats.total_cost, dec!(123.25));
        assert_eq!(stats.average_consumption, Some(dec!(8)));
        assert_eq!(stats.best_consumption, Some(dec!(8)));
        assert_eq!(stats.worst_consumption, Some(dec!(8)));
        assert_eq!(
            stats.cost_per_distance(DistanceUnit::Kilometers),
            Some(dec!(0.12325))
        );
    }

    #[test]
    fn window_covers_calendar_months() {
        let now = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
        assert_eq!(
            window_start(3, now),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap())
        );
        assert_eq!(window_start(0, now), None);
    }
}
