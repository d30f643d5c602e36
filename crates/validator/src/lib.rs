//! Pre-submission validation. Repairs what it can (clamps), drops what it
//! must (stale or unknown flights), and reports everything it touched so
//! the round log shows each repair delta.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use core_types::{
    AircraftType, Airport, ClassVec, FlightPhase, RoundDecision, CLASSES, PER_CLASS_API_MAX,
};
use state_mirror::MirrorState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Flight ids removed entirely (unknown, departed, or in the past).
    pub dropped: Vec<String>,
    pub repaired: RoundDecision,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    /// Check and repair a decision against the mirror. Warnings are the
    /// optimizer's mistakes (clamped and submitted anyway); errors abort
    /// the round and should not occur in practice.
    pub fn validate(
        &self,
        decision: &RoundDecision,
        mirror: &MirrorState,
        aircraft: &BTreeMap<String, AircraftType>,
        hub: Option<&Airport>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let now = mirror.current_hour();

        // Departure-ordered pass so inventory clamping never double-counts
        // stock across flights leaving the same airport.
        let mut ordered: Vec<(&String, &ClassVec)> = decision.loads.iter().collect();
        ordered.sort_by_key(|(id, _)| {
            mirror
                .flight(id)
                .map(|f| (f.scheduled_departure, (*id).clone()))
                .unwrap_or((now, (*id).clone()))
        });

        let mut remaining: BTreeMap<String, ClassVec> = BTreeMap::new();
        for (flight_id, kits) in ordered {
            let Some(flight) = mirror.flight(flight_id) else {
                report
                    .warnings
                    .push(format!("{flight_id}: unknown flight, load dropped"));
                report.dropped.push(flight_id.clone());
                continue;
            };
            if flight.phase >= FlightPhase::Departed {
                report.warnings.push(format!(
                    "{flight_id}: already {:?}, load dropped",
                    flight.phase
                ));
                report.dropped.push(flight_id.clone());
                continue;
            }
            if flight.scheduled_departure < now {
                report.warnings.push(format!(
                    "{flight_id}: departure {} behind current hour {now}, load dropped",
                    flight.scheduled_departure
                ));
                report.dropped.push(flight_id.clone());
                continue;
            }

            let capacity = match aircraft.get(&flight.aircraft_type) {
                Some(craft) => craft.kit_capacity,
                None => {
                    report.warnings.push(format!(
                        "{flight_id}: unknown aircraft type {}, load dropped",
                        flight.aircraft_type
                    ));
                    report.dropped.push(flight_id.clone());
                    continue;
                }
            };

            let available = remaining
                .entry(flight.origin.clone())
                .or_insert_with(|| mirror.inventory(&flight.origin).clamp_min_zero());
            let mut repaired = ClassVec::ZERO;
            for &class in &CLASSES {
                let mut value = kits[class];
                if value < 0 {
                    report
                        .warnings
                        .push(format!("{flight_id}: negative {class} load clamped to 0"));
                    value = 0;
                }
                if value > capacity[class] {
                    report.warnings.push(format!(
                        "{flight_id}: {class} load {value} over aircraft capacity {}, clamped",
                        capacity[class]
                    ));
                    value = capacity[class];
                }
                if value > available[class] {
                    report.warnings.push(format!(
                        "{flight_id}: {class} load {value} over available stock {} at {}, clamped",
                        available[class], flight.origin
                    ));
                    value = available[class];
                }
                repaired[class] = value;
                available[class] -= value;
            }
            if !repaired.is_zero() {
                report.repaired.loads.insert(flight_id.clone(), repaired);
            }
        }

        report.repaired.purchases = self.repair_purchases(decision.purchases, hub, &mut report);

        for warning in &report.warnings {
            tracing::warn!(%warning, "validation repair");
        }
        report
    }

    fn repair_purchases(
        &self,
        purchases: ClassVec,
        hub: Option<&Airport>,
        report: &mut ValidationReport,
    ) -> ClassVec {
        if hub.is_none() && !purchases.is_zero() {
            report
                .warnings
                .push("purchases dropped: no hub in catalog".to_string());
            return ClassVec::ZERO;
        }
        ClassVec::from_fn(|class| {
            let value = purchases[class];
            if value < 0 {
                report
                    .warnings
                    .push(format!("negative {class} purchase clamped to 0"));
                return 0;
            }
            if value > PER_CLASS_API_MAX {
                report.warnings.push(format!(
                    "{class} purchase {value} over API bound {PER_CLASS_API_MAX}, clamped"
                ));
                return PER_CLASS_API_MAX;
            }
            value
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ClassMoney, Flight, FlightEvent, FlightEventKind, GameHour};

    fn airport(code: &str, is_hub: bool, inventory: ClassVec) -> Airport {
        Airport {
            code: code.to_string(),
            name: code.to_string(),
            is_hub,
            storage_capacity: ClassVec::splat(100),
            loading_cost: ClassMoney::splat(10.0),
            processing_cost: ClassMoney::splat(5.0),
            processing_hours: ClassVec::splat(2),
            initial_inventory: inventory,
        }
    }

    fn aircraft_map() -> BTreeMap<String, AircraftType> {
        let mut map = BTreeMap::new();
        map.insert(
            "A320".to_string(),
            AircraftType {
                code: "A320".to_string(),
                passenger_capacity: ClassVec([4, 10, 6, 150]),
                kit_capacity: ClassVec([2, 5, 3, 10]),
                fuel_cost_per_km: 0.4,
            },
        );
        map
    }

    fn flight(id: &str, dep: i64) -> Flight {
        Flight {
            id: id.to_string(),
            number: format!("KR{id}"),
            origin: "HUB".to_string(),
            destination: "OUT".to_string(),
            scheduled_departure: GameHour(dep),
            scheduled_arrival: GameHour(dep + 4),
            aircraft_type: "A320".to_string(),
            distance: 500.0,
            planned_passengers: ClassVec([1, 3, 2, 8]),
            actual_passengers: None,
            actual_distance: None,
            phase: core_types::FlightPhase::Announced,
        }
    }

    fn mirror_with(flights: Vec<Flight>, advance: i64) -> MirrorState {
        let airports = [
            airport("HUB", true, ClassVec([10, 10, 10, 50])),
            airport("OUT", false, ClassVec::splat(20)),
        ];
        let mut mirror = MirrorState::new(GameHour(0), airports.iter());
        let mut events = Vec::new();
        for f in flights {
            events.push(FlightEvent {
                kind: FlightEventKind::Scheduled,
                flight: f.clone(),
            });
            events.push(FlightEvent {
                kind: FlightEventKind::CheckedIn,
                flight: f,
            });
        }
        mirror.apply_events(&events);
        if advance > 0 {
            mirror.advance_to(GameHour(advance));
        }
        mirror
    }

    fn decision(loads: Vec<(&str, ClassVec)>, purchases: ClassVec) -> RoundDecision {
        RoundDecision {
            loads: loads
                .into_iter()
                .map(|(id, k)| (id.to_string(), k))
                .collect(),
            purchases,
        }
    }

    #[test]
    fn unknown_flight_is_dropped_with_warning() {
        let mirror = mirror_with(vec![flight("F1", 5)], 0);
        let report = Validator.validate(
            &decision(
                vec![("GHOST", ClassVec::splat(1)), ("F1", ClassVec([1, 1, 1, 1]))],
                ClassVec::ZERO,
            ),
            &mirror,
            &aircraft_map(),
            None,
        );
        assert!(report.is_valid());
        assert_eq!(report.dropped, vec!["GHOST".to_string()]);
        assert!(report.repaired.loads.contains_key("F1"));
    }

    #[test]
    fn departed_and_past_flights_are_never_submitted() {
        // F1 departs at hour 2; advancing to 3 makes it DEPARTED.
        let mirror = mirror_with(vec![flight("F1", 2), flight("F2", 10)], 3);
        let report = Validator.validate(
            &decision(
                vec![("F1", ClassVec::splat(1)), ("F2", ClassVec([1, 1, 1, 1]))],
                ClassVec::ZERO,
            ),
            &mirror,
            &aircraft_map(),
            None,
        );
        assert_eq!(report.dropped, vec!["F1".to_string()]);
        assert!(report.repaired.loads.contains_key("F2"));
    }

    #[test]
    fn capacity_violations_are_clamped() {
        let mirror = mirror_with(vec![flight("F1", 5)], 0);
        let report = Validator.validate(
            &decision(vec![("F1", ClassVec([5, 9, 9, 30]))], ClassVec::ZERO),
            &mirror,
            &aircraft_map(),
            None,
        );
        assert_eq!(report.repaired.loads["F1"], ClassVec([2, 5, 3, 10]));
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn inventory_clamp_is_chronological_across_flights() {
        // Both flights draw economy from HUB (stock 50): first-departing
        // flight wins the contested stock.
        let mirror = mirror_with(vec![flight("A", 2), flight("B", 4)], 0);
        let report = Validator.validate(
            &decision(
                vec![
                    ("B", ClassVec([0, 0, 0, 10])),
                    ("A", ClassVec([0, 0, 0, 10])),
                ],
                ClassVec::ZERO,
            ),
            &mirror,
            &aircraft_map(),
            None,
        );
        let total: i64 = report
            .repaired
            .loads
            .values()
            .map(|k| k[core_types::Class::Economy])
            .sum();
        assert!(total <= 50);
    }

    #[test]
    fn purchases_are_bounded_and_hub_gated() {
        let mirror = mirror_with(vec![], 0);
        let hub = airport("HUB", true, ClassVec::splat(10));

        let report = Validator.validate(
            &decision(vec![], ClassVec([50_000, -3, 10, 0])),
            &mirror,
            &aircraft_map(),
            Some(&hub),
        );
        assert_eq!(
            report.repaired.purchases,
            ClassVec([PER_CLASS_API_MAX, 0, 10, 0])
        );

        let report = Validator.validate(
            &decision(vec![], ClassVec::splat(5)),
            &mirror,
            &aircraft_map(),
            None,
        );
        assert_eq!(report.repaired.purchases, ClassVec::ZERO);
    }
}
