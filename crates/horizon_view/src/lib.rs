//! Derives, for one current hour, the flights that are loadable now and
//! the class-level demand forecast over the purchase horizon.

use serde::{Deserialize, Serialize};

use core_types::{ClassVec, Flight, FlightPhase, GameHour, KitClassMeta};
use state_mirror::MirrorState;

/// Tactical and strategic window sizes. The load window is short enough
/// that actuals are trustworthy; the purchase window is long enough that
/// the slowest lead time plus processing completes inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonConfig {
    pub load_window_hours: i64,
    pub purchase_window_hours: i64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            load_window_hours: 6,
            purchase_window_hours: 72,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonView {
    pub now: GameHour,
    /// Exclusive end of the purchase window.
    pub purchase_end: GameHour,
    /// Checked-in flights departing within the load window, in departure
    /// order (ties broken by id for reproducibility).
    pub loadable: Vec<Flight>,
    /// Every known flight departing within the purchase window, departure
    /// ordered. Purchase policies derive their demand sums from this.
    pub upcoming: Vec<Flight>,
    /// Per-class demand a purchase placed now could still serve: flights
    /// departing before `now + lead_time + hub processing` are excluded
    /// for that class.
    pub reachable_demand: ClassVec,
}

impl HorizonView {
    pub fn build(
        mirror: &MirrorState,
        cfg: &HorizonConfig,
        kit_meta: &[KitClassMeta; 4],
        hub_processing: ClassVec,
    ) -> Self {
        let now = mirror.current_hour();
        let load_end = now + cfg.load_window_hours;
        let purchase_end = now + cfg.purchase_window_hours;

        let mut loadable: Vec<Flight> = mirror
            .flights()
            .filter(|f| {
                f.phase == FlightPhase::CheckedIn
                    && f.scheduled_departure >= now
                    && f.scheduled_departure < load_end
            })
            .cloned()
            .collect();
        loadable.sort_by(|a, b| {
            (a.scheduled_departure, &a.id).cmp(&(b.scheduled_departure, &b.id))
        });

        let mut upcoming: Vec<Flight> = mirror
            .flights()
            .filter(|f| {
                f.phase < FlightPhase::Departed
                    && f.scheduled_departure >= now
                    && f.scheduled_departure < purchase_end
            })
            .cloned()
            .collect();
        upcoming.sort_by(|a, b| {
            (a.scheduled_departure, &a.id).cmp(&(b.scheduled_departure, &b.id))
        });

        let reachable_demand = ClassVec::from_fn(|c| {
            let eta = now + kit_meta[c.index()].lead_time_hours + hub_processing[c];
            upcoming
                .iter()
                .filter(|f| f.scheduled_departure >= eta)
                .map(|f| f.expected_passengers()[c])
                .sum()
        });

        Self {
            now,
            purchase_end,
            loadable,
            upcoming,
            reachable_demand,
        }
    }

    /// Per-class demand from upcoming flights departing in `[from, to)`.
    pub fn demand_between(&self, from: GameHour, to: GameHour) -> ClassVec {
        ClassVec::from_fn(|c| {
            self.upcoming
                .iter()
                .filter(|f| f.scheduled_departure >= from && f.scheduled_departure < to)
                .map(|f| f.expected_passengers()[c])
                .sum()
        })
    }

    /// Demand over the whole purchase window, regardless of reachability.
    pub fn total_demand(&self) -> ClassVec {
        let mut out = ClassVec::ZERO;
        for f in &self.upcoming {
            out += f.expected_passengers();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Airport, Class, ClassMoney, FlightEvent, FlightEventKind};

    fn airport(code: &str, is_hub: bool) -> Airport {
        Airport {
            code: code.to_string(),
            name: code.to_string(),
            is_hub,
            storage_capacity: ClassVec::splat(100),
            loading_cost: ClassMoney::splat(10.0),
            processing_cost: ClassMoney::splat(5.0),
            processing_hours: ClassVec::splat(2),
            initial_inventory: ClassVec::splat(20),
        }
    }

    fn flight(id: &str, dep: i64, passengers: ClassVec) -> Flight {
        Flight {
            id: id.to_string(),
            number: format!("KR{id}"),
            origin: "HUB".to_string(),
            destination: "OUT".to_string(),
            scheduled_departure: GameHour(dep),
            scheduled_arrival: GameHour(dep + 4),
            aircraft_type: "A320".to_string(),
            distance: 500.0,
            planned_passengers: passengers,
            actual_passengers: None,
            actual_distance: None,
            phase: FlightPhase::Announced,
        }
    }

    fn mirror_with(events: Vec<FlightEvent>) -> MirrorState {
        let airports = [airport("HUB", true), airport("OUT", false)];
        let mut m = MirrorState::new(GameHour(0), airports.iter());
        m.apply_events(&events);
        m
    }

    fn checked_in(f: Flight) -> FlightEvent {
        FlightEvent {
            kind: FlightEventKind::CheckedIn,
            flight: f,
        }
    }

    fn scheduled(f: Flight) -> FlightEvent {
        FlightEvent {
            kind: FlightEventKind::Scheduled,
            flight: f,
        }
    }

    #[test]
    fn loadable_requires_check_in_and_window() {
        let mirror = mirror_with(vec![
            scheduled(flight("A", 2, ClassVec::splat(1))),
            checked_in(flight("A", 2, ClassVec::splat(1))),
            // Announced only: not loadable.
            scheduled(flight("B", 3, ClassVec::splat(1))),
            // Checked in but beyond the 6h window.
            scheduled(flight("C", 9, ClassVec::splat(1))),
            checked_in(flight("C", 9, ClassVec::splat(1))),
        ]);
        let view = HorizonView::build(
            &mirror,
            &HorizonConfig::default(),
            &KitClassMeta::standard_set(),
            ClassVec::splat(2),
        );
        let ids: Vec<&str> = view.loadable.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);
    }

    #[test]
    fn departing_this_hour_is_still_loadable() {
        let mirror = mirror_with(vec![
            scheduled(flight("A", 0, ClassVec::splat(1))),
            checked_in(flight("A", 0, ClassVec::splat(1))),
        ]);
        let view = HorizonView::build(
            &mirror,
            &HorizonConfig::default(),
            &KitClassMeta::standard_set(),
            ClassVec::splat(2),
        );
        assert_eq!(view.loadable.len(), 1);
    }

    #[test]
    fn reachable_demand_excludes_flights_inside_the_lead_time() {
        // ECONOMY lead 12 + hub processing 2 = 14h lag.
        let mirror = mirror_with(vec![
            scheduled(flight("EARLY", 10, ClassVec([0, 0, 0, 40]))),
            scheduled(flight("LATE", 30, ClassVec([0, 0, 0, 25]))),
        ]);
        let view = HorizonView::build(
            &mirror,
            &HorizonConfig::default(),
            &KitClassMeta::standard_set(),
            ClassVec::splat(2),
        );
        assert_eq!(view.reachable_demand[Class::Economy], 25);
        assert_eq!(view.total_demand()[Class::Economy], 65);
        // FIRST lead 48 + 2 puts even hour 30 out of reach.
        assert_eq!(view.reachable_demand[Class::First], 0);
    }

    #[test]
    fn demand_between_is_half_open() {
        let mirror = mirror_with(vec![
            scheduled(flight("A", 10, ClassVec([0, 1, 0, 0]))),
            scheduled(flight("B", 20, ClassVec([0, 2, 0, 0]))),
        ]);
        let view = HorizonView::build(
            &mirror,
            &HorizonConfig::default(),
            &KitClassMeta::standard_set(),
            ClassVec::splat(2),
        );
        assert_eq!(
            view.demand_between(GameHour(10), GameHour(20))[Class::Business],
            1
        );
        assert_eq!(
            view.demand_between(GameHour(10), GameHour(21))[Class::Business],
            3
        );
    }
}
