//! Fitness: price an individual by simulating the mirror forward over the
//! purchase horizon. Operational costs and flight penalties come straight
//! from the cost model; inventory penalties come from walking the
//! projected per-airport timeline hour by hour.
//!
//! The projection folds in (a) the mirror's pending movements, (b) the
//! individual's loads and purchases, and (c) the expected passenger drain
//! of upcoming flights not yet loadable — future rounds will load roughly
//! passenger counts, and without that drain a purchase would never pay for
//! itself inside the objective.

use std::collections::BTreeMap;

use core_types::{ClassVec, GameHour, KitMovement, CLASSES};

use crate::{Individual, OptimizeContext};

fn add(
    deltas: &mut BTreeMap<String, BTreeMap<i64, ClassVec>>,
    airport: &str,
    hour: GameHour,
    class: core_types::Class,
    qty: i64,
) {
    if qty == 0 {
        return;
    }
    deltas
        .entry(airport.to_string())
        .or_default()
        .entry(hour.0)
        .or_default()[class] += qty;
}

pub fn evaluate(ctx: &OptimizeContext, individual: &Individual) -> f64 {
    let now = ctx.view.now;
    let end = ctx.view.purchase_end;
    let mut total = ctx.cost.purchase_cost(&individual.purchases);

    let mut deltas: BTreeMap<String, BTreeMap<i64, ClassVec>> = BTreeMap::new();

    // Pending mirror movements.
    for movement in ctx.mirror.pending() {
        match movement {
            KitMovement::PurchaseDelivery {
                ready_hour,
                quantities,
            } => {
                if let Some(hub) = ctx.hub {
                    for &c in &CLASSES {
                        add(&mut deltas, &hub.code, *ready_hour, c, quantities[c]);
                    }
                }
            }
            KitMovement::Processing {
                airport,
                ready_hour,
                quantities,
            } => {
                for &c in &CLASSES {
                    add(&mut deltas, airport, *ready_hour, c, quantities[c]);
                }
            }
            KitMovement::InTransit {
                destination,
                arrive_hour,
                quantities,
                ..
            } => {
                let processing = ctx
                    .airports
                    .get(destination)
                    .map(|a| a.processing_hours)
                    .unwrap_or_default();
                for &c in &CLASSES {
                    add(&mut deltas, destination, *arrive_hour + processing[c], c, quantities[c]);
                }
            }
        }
    }

    // The individual's purchases, available after lead time plus hub
    // processing.
    if let Some(hub) = ctx.hub {
        for &c in &CLASSES {
            let ready = now + ctx.kit_meta[c.index()].lead_time_hours + hub.processing_hours[c];
            add(&mut deltas, &hub.code, ready, c, individual.purchases[c]);
        }
    }

    // Loadable flights: full per-flight objective plus inventory flow.
    for (flight, kits) in ctx.view.loadable.iter().zip(&individual.loads) {
        let (Some(origin), Some(dest), Some(craft)) = (
            ctx.airports.get(&flight.origin),
            ctx.airports.get(&flight.destination),
            ctx.aircraft.get(&flight.aircraft_type),
        ) else {
            continue;
        };
        let passengers = flight.expected_passengers();
        total += ctx.cost.flight_objective(
            origin,
            dest,
            craft,
            flight.effective_distance(),
            &passengers,
            kits,
        );
        for &c in &CLASSES {
            add(&mut deltas, &flight.origin, flight.scheduled_departure, c, -kits[c]);
            add(&mut deltas, &flight.destination,
                flight.scheduled_arrival + dest.processing_hours[c],
                c,
                kits[c],
            );
        }
    }

    // Expected drain of flights beyond the tactical window.
    let loadable_ids: Vec<&str> = ctx.view.loadable.iter().map(|f| f.id.as_str()).collect();
    for flight in &ctx.view.upcoming {
        if loadable_ids.contains(&flight.id.as_str()) {
            continue;
        }
        let passengers = flight.expected_passengers();
        let processing = ctx
            .airports
            .get(&flight.destination)
            .map(|a| a.processing_hours)
            .unwrap_or_default();
        for &c in &CLASSES {
            add(&mut deltas, &flight.origin, flight.scheduled_departure, c, -passengers[c]);
            add(&mut deltas, &flight.destination,
                flight.scheduled_arrival + processing[c],
                c,
                passengers[c],
            );
        }
    }

    // Hour-by-hour inventory walk per airport.
    let terminal = end.0 >= core_types::TOTAL_ROUNDS;
    for (code, airport) in ctx.airports {
        let airport_deltas = deltas.get(code);
        let mut running = ctx.mirror.inventory(code);
        for h in now.0..=end.0 {
            if let Some(delta) = airport_deltas.and_then(|m| m.get(&h)) {
                running += *delta;
            }
            total += ctx.cost.negative_inventory_penalty(&running);
            total += ctx.cost.overstock_penalty(airport, &running);
        }
        // Terminal phase: whatever is still on the shelf at game end is
        // charged, tilting the last hours toward depletion.
        if terminal {
            total += ctx.cost.terminal_stock_penalty(&running);
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    use core_types::{
        AircraftType, Airport, ClassMoney, Flight, FlightEvent, FlightEventKind, FlightPhase,
        KitClassMeta,
    };
    use cost_model::CostModel;
    use horizon_view::{HorizonConfig, HorizonView};
    use state_mirror::MirrorState;

    fn airport(code: &str, is_hub: bool, inventory: ClassVec) -> Airport {
        Airport {
            code: code.to_string(),
            name: code.to_string(),
            is_hub,
            storage_capacity: ClassVec::splat(100),
            loading_cost: ClassMoney::splat(1.0),
            processing_cost: ClassMoney::splat(0.5),
            processing_hours: ClassVec::splat(2),
            initial_inventory: inventory,
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

    struct Fx {
        mirror: MirrorState,
        view: HorizonView,
        airports: Map<String, Airport>,
        aircraft: Map<String, AircraftType>,
        cost: CostModel,
        kit_meta: [KitClassMeta; 4],
    }

    impl Fx {
        fn ctx(&self) -> OptimizeContext<'_> {
            OptimizeContext {
                mirror: &self.mirror,
                view: &self.view,
                airports: &self.airports,
                aircraft: &self.aircraft,
                hub: self.airports.values().find(|a| a.is_hub),
                cost: &self.cost,
                kit_meta: &self.kit_meta,
            }
        }
    }

    fn fx(hub_inventory: ClassVec, flights: Vec<(Flight, bool)>) -> Fx {
        let hub = airport("HUB", true, hub_inventory);
        let out = airport("OUT", false, ClassVec::splat(20));
        let mut airports = Map::new();
        airports.insert(hub.code.clone(), hub.clone());
        airports.insert(out.code.clone(), out);
        let mut mirror = MirrorState::new(GameHour(0), airports.values());
        let mut events = Vec::new();
        for (f, checked) in flights {
            events.push(FlightEvent {
                kind: FlightEventKind::Scheduled,
                flight: f.clone(),
            });
            if checked {
                events.push(FlightEvent {
                    kind: FlightEventKind::CheckedIn,
                    flight: f,
                });
            }
        }
        mirror.apply_events(&events);
        let view = HorizonView::build(
            &mirror,
            &HorizonConfig::default(),
            &KitClassMeta::standard_set(),
            ClassVec::splat(2),
        );
        let mut aircraft = Map::new();
        aircraft.insert(
            "A320".to_string(),
            AircraftType {
                code: "A320".to_string(),
                passenger_capacity: ClassVec([4, 10, 6, 150]),
                kit_capacity: ClassVec([2, 5, 3, 10]),
                fuel_cost_per_km: 0.001,
            },
        );
        Fx {
            mirror,
            view,
            airports,
            aircraft,
            cost: CostModel::default(),
            kit_meta: KitClassMeta::standard_set(),
        }
    }

    fn individual(loads: Vec<ClassVec>, purchases: ClassVec) -> Individual {
        Individual {
            loads,
            purchases,
            fitness: f64::INFINITY,
        }
    }

    #[test]
    fn covering_passengers_beats_shipping_nothing() {
        let f = fx(
            ClassVec([10, 10, 10, 50]),
            vec![(flight("F1", 2, ClassVec([1, 3, 2, 8])), true)],
        );
        let ctx = f.ctx();
        let full = evaluate(&ctx, &individual(vec![ClassVec([1, 3, 2, 8])], ClassVec::ZERO));
        let none = evaluate(&ctx, &individual(vec![ClassVec::ZERO], ClassVec::ZERO));
        assert!(full < none);
    }

    #[test]
    fn a_purchase_that_prevents_shortage_pays_for_itself() {
        // Economy demand of 60 at hour 30 against a stock of 20: without a
        // purchase the projection dives negative.
        let f = fx(
            ClassVec([0, 0, 0, 20]),
            vec![(flight("LATE", 30, ClassVec([0, 0, 0, 60])), false)],
        );
        let ctx = f.ctx();
        let bought = evaluate(&ctx, &individual(vec![], ClassVec([0, 0, 0, 40])));
        let skipped = evaluate(&ctx, &individual(vec![], ClassVec::ZERO));
        assert!(bought < skipped);
    }

    #[test]
    fn evaluation_is_pure() {
        let f = fx(
            ClassVec([10, 10, 10, 50]),
            vec![(flight("F1", 2, ClassVec([1, 3, 2, 8])), true)],
        );
        let ctx = f.ctx();
        let ind = individual(vec![ClassVec([1, 3, 2, 8])], ClassVec([0, 0, 0, 5]));
        assert_eq!(evaluate(&ctx, &ind), evaluate(&ctx, &ind));
    }
}
