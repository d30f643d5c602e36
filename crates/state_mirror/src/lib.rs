//! Per-session projection of airport inventories, in-flight movements,
//! processing queues and pending purchase deliveries, reconstructed
//! incrementally from the evaluation server's event stream.
//!
//! The mirror never throws on an inconsistent projection: it records a
//! `MirrorAnomaly` and continues with the server's last known truth as the
//! authority.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use core_types::{
    Airport, AnomalyKind, ClassVec, Flight, FlightEvent, FlightEventKind, FlightPhase, GameHour,
    HourOutcome, KitClassMeta, KitMovement, MirrorAnomaly, PenaltyNotice, CLASSES,
};

/// Negative or overstocked inventory observed at an hour boundary.
/// Collected for the optimizer's penalty tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryViolation {
    pub at: GameHour,
    pub airport: String,
    pub negative: ClassVec,
    pub overstock: ClassVec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorState {
    current_hour: GameHour,
    inventories: BTreeMap<String, ClassVec>,
    storage_capacity: BTreeMap<String, ClassVec>,
    airport_processing: BTreeMap<String, ClassVec>,
    hub_code: Option<String>,
    pending: Vec<KitMovement>,
    flights: BTreeMap<String, Flight>,
    /// Latest committed load per flight; a resubmission overwrites.
    committed: BTreeMap<String, ClassVec>,
    departed: BTreeSet<String>,
    arrival_converted: BTreeSet<String>,
    total_cost: f64,
    round_penalties: Vec<PenaltyNotice>,
    anomalies: Vec<MirrorAnomaly>,
    violations: Vec<BoundaryViolation>,
}

impl MirrorState {
    pub fn new<'a>(start: GameHour, airports: impl IntoIterator<Item = &'a Airport>) -> Self {
        let mut inventories = BTreeMap::new();
        let mut storage_capacity = BTreeMap::new();
        let mut airport_processing = BTreeMap::new();
        let mut hub_code = None;
        for airport in airports {
            inventories.insert(airport.code.clone(), airport.initial_inventory);
            storage_capacity.insert(airport.code.clone(), airport.storage_capacity);
            airport_processing.insert(airport.code.clone(), airport.processing_hours);
            if airport.is_hub {
                hub_code = Some(airport.code.clone());
            }
        }
        Self {
            current_hour: start,
            inventories,
            storage_capacity,
            airport_processing,
            hub_code,
            pending: Vec::new(),
            flights: BTreeMap::new(),
            committed: BTreeMap::new(),
            departed: BTreeSet::new(),
            arrival_converted: BTreeSet::new(),
            total_cost: 0.0,
            round_penalties: Vec::new(),
            anomalies: Vec::new(),
            violations: Vec::new(),
        }
    }

    pub fn current_hour(&self) -> GameHour {
        self.current_hour
    }

    pub fn hub_code(&self) -> Option<&str> {
        self.hub_code.as_deref()
    }

    pub fn inventory(&self, airport: &str) -> ClassVec {
        self.inventories.get(airport).copied().unwrap_or_default()
    }

    pub fn inventories(&self) -> &BTreeMap<String, ClassVec> {
        &self.inventories
    }

    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.flights.values()
    }

    pub fn flight(&self, id: &str) -> Option<&Flight> {
        self.flights.get(id)
    }

    pub fn pending(&self) -> &[KitMovement] {
        &self.pending
    }

    pub fn committed_load(&self, flight_id: &str) -> Option<ClassVec> {
        self.committed.get(flight_id).copied()
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn round_penalties(&self) -> &[PenaltyNotice] {
        &self.round_penalties
    }

    pub fn anomalies(&self) -> &[MirrorAnomaly] {
        &self.anomalies
    }

    pub fn drain_anomalies(&mut self) -> Vec<MirrorAnomaly> {
        std::mem::take(&mut self.anomalies)
    }

    pub fn violations(&self) -> &[BoundaryViolation] {
        &self.violations
    }

    pub fn drain_violations(&mut self) -> Vec<BoundaryViolation> {
        std::mem::take(&mut self.violations)
    }

    /// Kits currently outside any inventory: pending movements plus
    /// reservations committed but not yet departed. Together with
    /// on-hand inventory this is the conserved total.
    pub fn kits_in_motion(&self) -> i64 {
        let pending: i64 = self.pending.iter().map(|m| m.quantities().total()).sum();
        let reserved: i64 = self
            .committed
            .iter()
            .filter(|(id, _)| !self.departed.contains(*id))
            .map(|(_, k)| k.total())
            .sum();
        pending + reserved
    }

    pub fn on_hand_total(&self) -> i64 {
        self.inventories.values().map(ClassVec::total).sum()
    }

    fn record_anomaly(&mut self, kind: AnomalyKind, detail: String) {
        tracing::warn!(?kind, %detail, at = %self.current_hour, "mirror anomaly");
        self.anomalies.push(MirrorAnomaly {
            kind,
            at: self.current_hour,
            detail,
        });
    }

    fn insert_pending(&mut self, movement: KitMovement) {
        let key = movement.sort_key();
        let idx = self.pending.partition_point(|m| m.sort_key() <= key);
        self.pending.insert(idx, movement);
    }

    /// Fold one round response into the mirror: apply the events in server
    /// order, advance one hour past the played round, and record the
    /// authoritative cumulative cost and penalty list (observation only).
    pub fn ingest(&mut self, outcome: &HourOutcome) {
        self.apply_events(&outcome.events);
        self.advance_to(outcome.at + 1);
        self.record_totals(outcome.total_cost, &outcome.penalties);
    }

    /// Record the server's authoritative cumulative cost and this round's
    /// penalty list. Observation only; never feeds back into inventory.
    pub fn record_totals(&mut self, total_cost: f64, penalties: &[PenaltyNotice]) {
        self.total_cost = total_cost;
        self.round_penalties = penalties.to_vec();
    }

    pub fn apply_events(&mut self, events: &[FlightEvent]) {
        for event in events {
            match event.kind {
                FlightEventKind::Scheduled => self.on_scheduled(&event.flight),
                FlightEventKind::CheckedIn => self.on_checked_in(&event.flight),
                FlightEventKind::Landed => self.on_landed(&event.flight),
            }
        }
    }

    fn on_scheduled(&mut self, incoming: &Flight) {
        let phase = self.flights.get(&incoming.id).map(|f| f.phase);
        match phase {
            None | Some(FlightPhase::Announced) => {
                let mut flight = incoming.clone();
                flight.phase = FlightPhase::Announced;
                self.flights.insert(flight.id.clone(), flight);
            }
            Some(progressed) => {
                // Keep the progressed record; only refresh schedule fields.
                if let Some(existing) = self.flights.get_mut(&incoming.id) {
                    existing.scheduled_departure = incoming.scheduled_departure;
                    existing.scheduled_arrival = incoming.scheduled_arrival;
                }
                self.record_anomaly(
                    AnomalyKind::PhaseRegression,
                    format!("SCHEDULED for {} already in phase {progressed:?}", incoming.id),
                );
            }
        }
    }

    fn on_checked_in(&mut self, incoming: &Flight) {
        let phase = self.flights.get(&incoming.id).map(|f| f.phase);
        match phase {
            None => {
                self.record_anomaly(
                    AnomalyKind::UnknownFlight,
                    format!("CHECKED_IN for unannounced flight {}", incoming.id),
                );
                let mut flight = incoming.clone();
                flight.phase = FlightPhase::CheckedIn;
                self.flights.insert(flight.id.clone(), flight);
            }
            Some(progressed) if progressed >= FlightPhase::Departed => {
                self.record_anomaly(
                    AnomalyKind::PhaseRegression,
                    format!(
                        "CHECKED_IN for {} already in phase {progressed:?}",
                        incoming.id
                    ),
                );
            }
            Some(_) => {
                if let Some(existing) = self.flights.get_mut(&incoming.id) {
                    existing.phase = FlightPhase::CheckedIn;
                    existing.actual_passengers = incoming
                        .actual_passengers
                        .or(Some(incoming.planned_passengers));
                    if incoming.actual_distance.is_some() {
                        existing.actual_distance = incoming.actual_distance;
                    }
                    existing.scheduled_departure = incoming.scheduled_departure;
                    existing.scheduled_arrival = incoming.scheduled_arrival;
                }
            }
        }
    }

    fn on_landed(&mut self, incoming: &Flight) {
        let arrival = incoming.scheduled_arrival;
        if !self.flights.contains_key(&incoming.id) {
            self.record_anomaly(
                AnomalyKind::UnknownFlight,
                format!("LANDED for unknown flight {}", incoming.id),
            );
            let mut flight = incoming.clone();
            flight.phase = FlightPhase::Landed;
            self.flights.insert(flight.id.clone(), flight);
            return;
        }
        if let Some(existing) = self.flights.get_mut(&incoming.id) {
            existing.phase = FlightPhase::Landed;
            existing.scheduled_arrival = arrival;
            if incoming.actual_distance.is_some() {
                existing.actual_distance = incoming.actual_distance;
            }
        }
        // A landed flight must have departed; reconcile a missed implicit
        // departure before converting the in-transit movement.
        self.ensure_departed(&incoming.id);
        self.convert_arrival(&incoming.id, arrival);
    }

    /// Turn the committed reservation for `flight_id` into an in-transit
    /// movement. Loads that were never committed move nothing.
    fn ensure_departed(&mut self, flight_id: &str) {
        if self.departed.contains(flight_id) {
            return;
        }
        let Some(flight) = self.flights.get(flight_id) else {
            return;
        };
        let Some(kits) = self.committed.get(flight_id).copied() else {
            self.departed.insert(flight_id.to_string());
            return;
        };
        if kits.is_zero() {
            self.departed.insert(flight_id.to_string());
            return;
        }
        let movement = KitMovement::InTransit {
            flight_id: flight_id.to_string(),
            destination: flight.destination.clone(),
            arrive_hour: flight.scheduled_arrival,
            quantities: kits,
        };
        if let Some(f) = self.flights.get_mut(flight_id) {
            if f.phase < FlightPhase::Departed {
                f.phase = FlightPhase::Departed;
            }
        }
        self.departed.insert(flight_id.to_string());
        self.insert_pending(movement);
    }

    /// Complete an in-transit movement into per-class processing queues at
    /// the destination. Idempotent per flight.
    fn convert_arrival(&mut self, flight_id: &str, arrival: GameHour) {
        if self.arrival_converted.contains(flight_id) {
            return;
        }
        let Some(idx) = self.pending.iter().position(|m| {
            matches!(m, KitMovement::InTransit { flight_id: id, .. } if id == flight_id)
        }) else {
            return;
        };
        let movement = self.pending.remove(idx);
        let KitMovement::InTransit {
            destination,
            quantities,
            ..
        } = movement
        else {
            return;
        };
        self.arrival_converted.insert(flight_id.to_string());
        self.fan_out_processing(&destination, quantities, arrival);
    }

    fn fan_out_processing(&mut self, destination: &str, quantities: ClassVec, arrival: GameHour) {
        let processing_hours = self
            .airport_processing
            .get(destination)
            .copied()
            .unwrap_or_default();
        // Per-class lags: one arrival can fan out into several processing
        // completions at different hours. Group classes sharing a lag.
        let mut by_ready: BTreeMap<i64, ClassVec> = BTreeMap::new();
        for &class in &CLASSES {
            if quantities[class] > 0 {
                let ready = arrival + processing_hours[class];
                by_ready.entry(ready.0).or_default()[class] = quantities[class];
            }
        }
        for (ready, kits) in by_ready {
            self.insert_pending(KitMovement::Processing {
                airport: destination.to_string(),
                ready_hour: GameHour(ready),
                quantities: kits,
            });
        }
    }

    /// Advance the mirror to hour `h`, completing every due movement in
    /// deterministic order and scanning inventories at each crossed
    /// boundary.
    pub fn advance_to(&mut self, h: GameHour) {
        if h < self.current_hour {
            self.record_anomaly(
                AnomalyKind::PhaseRegression,
                format!("advance_to {} behind current {}", h, self.current_hour),
            );
            return;
        }
        while self.current_hour < h {
            let boundary = self.current_hour + 1;
            self.complete_due(boundary);
            self.spawn_departures(boundary);
            self.current_hour = boundary;
            self.scan_boundary(boundary);
        }
    }

    fn complete_due(&mut self, boundary: GameHour) {
        // Due movements are a sorted prefix interleaved by hour; collect
        // then apply so arrivals can push new processing entries.
        loop {
            let Some(idx) = self
                .pending
                .iter()
                .position(|m| m.ready_hour() <= boundary)
            else {
                break;
            };
            let movement = self.pending.remove(idx);
            match movement {
                KitMovement::PurchaseDelivery { quantities, .. } => {
                    let Some(hub) = self.hub_code.clone() else {
                        continue;
                    };
                    *self.inventories.entry(hub).or_default() += quantities;
                }
                KitMovement::Processing {
                    airport,
                    quantities,
                    ..
                } => {
                    *self.inventories.entry(airport).or_default() += quantities;
                }
                KitMovement::InTransit {
                    flight_id,
                    arrive_hour,
                    destination,
                    quantities,
                } => {
                    // Scheduled arrival reached without a LANDED event yet.
                    if self.arrival_converted.insert(flight_id.clone()) {
                        self.fan_out_processing(&destination, quantities, arrive_hour);
                    }
                }
            }
        }
    }

    fn spawn_departures(&mut self, boundary: GameHour) {
        let due: Vec<String> = self
            .flights
            .values()
            .filter(|f| {
                f.phase == FlightPhase::CheckedIn
                    && f.scheduled_departure <= boundary
                    && !self.departed.contains(&f.id)
            })
            .map(|f| f.id.clone())
            .collect();
        for id in due {
            self.ensure_departed(&id);
        }
    }

    fn scan_boundary(&mut self, boundary: GameHour) {
        let mut found = Vec::new();
        for (code, inv) in &self.inventories {
            let negative = ClassVec::from_fn(|c| (-inv[c]).max(0));
            let capacity = self
                .storage_capacity
                .get(code)
                .copied()
                .unwrap_or_else(|| ClassVec::splat(i64::MAX / 4));
            let overstock = ClassVec::from_fn(|c| (inv[c] - capacity[c]).max(0));
            if !negative.is_zero() || !overstock.is_zero() {
                found.push(BoundaryViolation {
                    at: boundary,
                    airport: code.clone(),
                    negative,
                    overstock,
                });
            }
        }
        for violation in found {
            if !violation.negative.is_zero() {
                self.record_anomaly(
                    AnomalyKind::NegativeBalance,
                    format!(
                        "negative inventory at {} ({} kits) at {}",
                        violation.airport,
                        violation.negative.total(),
                        boundary
                    ),
                );
            }
            self.violations.push(violation);
        }
    }

    /// Reserve a submitted load: decrement origin inventory immediately
    /// (the server treats load-at-submission as authoritative) and store
    /// the quantity so the implicit departure can be reconciled. A second
    /// commit for the same flight overwrites the first.
    pub fn commit_loads(&mut self, loads: &BTreeMap<String, ClassVec>) {
        for (flight_id, kits) in loads {
            let Some(flight) = self.flights.get(flight_id) else {
                self.record_anomaly(
                    AnomalyKind::UnknownFlight,
                    format!("load committed for unknown flight {flight_id}"),
                );
                continue;
            };
            if flight.phase >= FlightPhase::Departed {
                let phase = flight.phase;
                self.record_anomaly(
                    AnomalyKind::PhaseRegression,
                    format!("load committed for {flight_id} already in phase {phase:?}"),
                );
                continue;
            }
            let origin = flight.origin.clone();
            if let Some(previous) = self.committed.insert(flight_id.clone(), *kits) {
                *self.inventories.entry(origin.clone()).or_default() += previous;
            }
            let inventory = self.inventories.entry(origin.clone()).or_default();
            *inventory -= *kits;
            if inventory.deficit() > 0 {
                let deficit = inventory.deficit();
                self.record_anomaly(
                    AnomalyKind::NegativeBalance,
                    format!("reservation overdraws {origin} by {deficit} kits"),
                );
            }
        }
    }

    /// Schedule a purchase order. Per-class lead times mean one logical
    /// order becomes up to four deliveries; each becomes available only
    /// after the hub's processing lag on top of the lead time.
    pub fn commit_purchase(&mut self, order: &ClassVec, kit_meta: &[KitClassMeta; 4]) {
        if order.is_zero() {
            return;
        }
        let Some(hub) = self.hub_code.clone() else {
            self.record_anomaly(
                AnomalyKind::UnknownFlight,
                "purchase committed without a hub in the catalog".to_string(),
            );
            return;
        };
        let hub_processing = self
            .airport_processing
            .get(&hub)
            .copied()
            .unwrap_or_default();
        for &class in &CLASSES {
            if order[class] <= 0 {
                continue;
            }
            let lead = kit_meta[class.index()].lead_time_hours;
            let ready = self.current_hour + lead + hub_processing[class];
            let mut quantities = ClassVec::ZERO;
            quantities[class] = order[class];
            self.insert_pending(KitMovement::PurchaseDelivery {
                ready_hour: ready,
                quantities,
            });
        }
    }
}
