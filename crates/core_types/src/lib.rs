use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Sub, SubAssign};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard per-class bound the evaluation API accepts for any submitted amount.
pub const PER_CLASS_API_MAX: i64 = 42_000;

/// A full game is 720 simulated hours.
pub const TOTAL_ROUNDS: i64 = 720;

pub const HOURS_PER_DAY: i64 = 24;

/// The four service classes, in the fixed order used by every per-class
/// vector in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Class {
    First,
    Business,
    PremiumEconomy,
    Economy,
}

pub const CLASSES: [Class; 4] = [
    Class::First,
    Class::Business,
    Class::PremiumEconomy,
    Class::Economy,
];

impl Class {
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Business => 1,
            Self::PremiumEconomy => 2,
            Self::Economy => 3,
        }
    }

    /// Uppercase name used by the static tables' column suffixes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Business => "BUSINESS",
            Self::PremiumEconomy => "PREMIUM_ECONOMY",
            Self::Economy => "ECONOMY",
        }
    }

    /// camelCase field name on the evaluation wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Business => "business",
            Self::PremiumEconomy => "premiumEconomy",
            Self::Economy => "economy",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width per-class vector of kit counts. Counts may go negative in
/// inventory projections; loads and purchases are kept non-negative by the
/// producing code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassVec(pub [i64; 4]);

impl ClassVec {
    pub const ZERO: ClassVec = ClassVec([0; 4]);

    pub fn splat(value: i64) -> Self {
        Self([value; 4])
    }

    pub fn from_fn(mut f: impl FnMut(Class) -> i64) -> Self {
        Self([
            f(Class::First),
            f(Class::Business),
            f(Class::PremiumEconomy),
            f(Class::Economy),
        ])
    }

    pub fn total(&self) -> i64 {
        self.0.iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Negative components clamped to zero.
    pub fn clamp_min_zero(&self) -> Self {
        Self::from_fn(|c| self[c].max(0))
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &ClassVec) -> Self {
        Self::from_fn(|c| self[c].min(other[c]))
    }

    /// Sum of components of `self` exceeding the matching component of `cap`.
    pub fn excess_over(&self, cap: &ClassVec) -> i64 {
        CLASSES.iter().map(|&c| (self[c] - cap[c]).max(0)).sum()
    }

    /// Sum of negative components, as a positive number.
    pub fn deficit(&self) -> i64 {
        self.0.iter().map(|v| (-v).max(0)).sum()
    }
}

impl Index<Class> for ClassVec {
    type Output = i64;

    fn index(&self, class: Class) -> &i64 {
        &self.0[class.index()]
    }
}

impl IndexMut<Class> for ClassVec {
    fn index_mut(&mut self, class: Class) -> &mut i64 {
        &mut self.0[class.index()]
    }
}

impl Add for ClassVec {
    type Output = ClassVec;

    fn add(self, rhs: ClassVec) -> ClassVec {
        ClassVec::from_fn(|c| self[c] + rhs[c])
    }
}

impl Sub for ClassVec {
    type Output = ClassVec;

    fn sub(self, rhs: ClassVec) -> ClassVec {
        ClassVec::from_fn(|c| self[c] - rhs[c])
    }
}

impl AddAssign for ClassVec {
    fn add_assign(&mut self, rhs: ClassVec) {
        *self = *self + rhs;
    }
}

impl SubAssign for ClassVec {
    fn sub_assign(&mut self, rhs: ClassVec) {
        *self = *self - rhs;
    }
}

/// Per-class money (or rate) vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMoney(pub [f64; 4]);

impl ClassMoney {
    pub fn splat(value: f64) -> Self {
        Self([value; 4])
    }

    pub fn from_fn(mut f: impl FnMut(Class) -> f64) -> Self {
        Self([
            f(Class::First),
            f(Class::Business),
            f(Class::PremiumEconomy),
            f(Class::Economy),
        ])
    }

    /// Dot product against a count vector.
    pub fn dot(&self, counts: &ClassVec) -> f64 {
        CLASSES.iter().map(|&c| self[c] * counts[c] as f64).sum()
    }
}

impl Index<Class> for ClassMoney {
    type Output = f64;

    fn index(&self, class: Class) -> &f64 {
        &self.0[class.index()]
    }
}

impl IndexMut<Class> for ClassMoney {
    fn index_mut(&mut self, class: Class) -> &mut f64 {
        &mut self.0[class.index()]
    }
}

/// Absolute game hour (day * 24 + hour). Hour 0 is the start of the game.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GameHour(pub i64);

impl GameHour {
    pub fn from_day_hour(day: i64, hour: i64) -> Self {
        Self(day * HOURS_PER_DAY + hour)
    }

    pub fn day(self) -> i64 {
        self.0.div_euclid(HOURS_PER_DAY)
    }

    pub fn hour_of_day(self) -> i64 {
        self.0.rem_euclid(HOURS_PER_DAY)
    }
}

impl Add<i64> for GameHour {
    type Output = GameHour;

    fn add(self, rhs: i64) -> GameHour {
        GameHour(self.0 + rhs)
    }
}

impl fmt::Display for GameHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}h{:02}", self.day(), self.hour_of_day())
    }
}

/// Immutable per-class kit metadata. Processing lag lives on the airport,
/// not here; purchased kits additionally pass hub processing after the
/// lead time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KitClassMeta {
    pub cost: f64,
    pub weight_kg: f64,
    pub lead_time_hours: i64,
}

impl KitClassMeta {
    /// Calibrated defaults for the standard kit set.
    pub fn standard(class: Class) -> Self {
        match class {
            Class::First => Self {
                cost: 200.0,
                weight_kg: 5.0,
                lead_time_hours: 48,
            },
            Class::Business => Self {
                cost: 150.0,
                weight_kg: 3.0,
                lead_time_hours: 36,
            },
            Class::PremiumEconomy => Self {
                cost: 100.0,
                weight_kg: 2.5,
                lead_time_hours: 24,
            },
            Class::Economy => Self {
                cost: 50.0,
                weight_kg: 1.5,
                lead_time_hours: 12,
            },
        }
    }

    pub fn standard_set() -> [KitClassMeta; 4] {
        [
            Self::standard(Class::First),
            Self::standard(Class::Business),
            Self::standard(Class::PremiumEconomy),
            Self::standard(Class::Economy),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    pub name: String,
    pub is_hub: bool,
    pub storage_capacity: ClassVec,
    pub loading_cost: ClassMoney,
    pub processing_cost: ClassMoney,
    pub processing_hours: ClassVec,
    pub initial_inventory: ClassVec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftType {
    pub code: String,
    pub passenger_capacity: ClassVec,
    pub kit_capacity: ClassVec,
    pub fuel_cost_per_km: f64,
}

/// Lifecycle of one flight as reported by the evaluation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlightPhase {
    Announced,
    CheckedIn,
    Departed,
    Landed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub number: String,
    pub origin: String,
    pub destination: String,
    pub scheduled_departure: GameHour,
    pub scheduled_arrival: GameHour,
    pub aircraft_type: String,
    pub distance: f64,
    pub planned_passengers: ClassVec,
    pub actual_passengers: Option<ClassVec>,
    pub actual_distance: Option<f64>,
    pub phase: FlightPhase,
}

impl Flight {
    /// Actual passenger counts once the flight has checked in, planned
    /// counts before that.
    pub fn expected_passengers(&self) -> ClassVec {
        if self.phase >= FlightPhase::CheckedIn {
            if let Some(actual) = self.actual_passengers {
                return actual;
            }
        }
        self.planned_passengers
    }

    /// Planned distance until check-in, actual thereafter when reported.
    pub fn effective_distance(&self) -> f64 {
        if self.phase >= FlightPhase::CheckedIn {
            if let Some(actual) = self.actual_distance {
                return actual;
            }
        }
        self.distance
    }
}

/// One pending entry in the mirror's movement queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KitMovement {
    InTransit {
        flight_id: String,
        destination: String,
        arrive_hour: GameHour,
        quantities: ClassVec,
    },
    Processing {
        airport: String,
        ready_hour: GameHour,
        quantities: ClassVec,
    },
    PurchaseDelivery {
        ready_hour: GameHour,
        quantities: ClassVec,
    },
}

impl KitMovement {
    pub fn ready_hour(&self) -> GameHour {
        match self {
            Self::InTransit { arrive_hour, .. } => *arrive_hour,
            Self::Processing { ready_hour, .. } => *ready_hour,
            Self::PurchaseDelivery { ready_hour, .. } => *ready_hour,
        }
    }

    pub fn quantities(&self) -> ClassVec {
        match self {
            Self::InTransit { quantities, .. } => *quantities,
            Self::Processing { quantities, .. } => *quantities,
            Self::PurchaseDelivery { quantities, .. } => *quantities,
        }
    }

    /// Deterministic ordering within one tick: purchases, then processing
    /// completions, then arrivals, then lexicographic by owning id.
    pub fn sort_key(&self) -> (i64, u8, String) {
        match self {
            Self::PurchaseDelivery { ready_hour, .. } => (ready_hour.0, 0, String::new()),
            Self::Processing {
                ready_hour, airport, ..
            } => (ready_hour.0, 1, airport.clone()),
            Self::InTransit {
                arrive_hour,
                flight_id,
                ..
            } => (arrive_hour.0, 2, flight_id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightEventKind {
    Scheduled,
    CheckedIn,
    Landed,
}

/// A flight update pushed back by the evaluation service. Each event
/// carries the full flight record as known at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightEvent {
    pub kind: FlightEventKind,
    pub flight: Flight,
}

/// A penalty line item reported by the evaluation service. Observation
/// only; penalties never feed back into inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyNotice {
    pub code: String,
    pub flight_id: Option<String>,
    pub flight_number: Option<String>,
    pub issued: GameHour,
    pub amount: f64,
    pub reason: String,
}

/// Server response to one played round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourOutcome {
    pub at: GameHour,
    pub events: Vec<FlightEvent>,
    pub penalties: Vec<PenaltyNotice>,
    /// Cumulative cost over the whole session so far.
    pub total_cost: f64,
}

/// The decision submitted for one round: a load per flight and a single
/// aggregate purchase order at the hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundDecision {
    pub loads: BTreeMap<String, ClassVec>,
    pub purchases: ClassVec,
}

impl RoundDecision {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn loaded_total(&self) -> i64 {
        self.loads.values().map(ClassVec::total).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    UnknownFlight,
    PhaseRegression,
    NegativeBalance,
}

/// A projection inconsistency the mirror absorbed instead of raising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorAnomaly {
    pub kind: AnomalyKind,
    pub at: GameHour,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout or 5xx. Retried by the transport wrapper.
    #[error("transport: {0}")]
    Transport(String),
    /// 400 from the server: our submission is malformed. Not retried.
    #[error("protocol rejection: {0}")]
    Protocol(String),
    #[error("session lost: {0}")]
    SessionLost(String),
    #[error("session conflict: {0}")]
    Conflict(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Seam to the evaluation platform. The production implementation speaks
/// HTTP; tests script outcomes in memory.
#[async_trait]
pub trait EvalService: Send + Sync {
    async fn start_session(&self) -> Result<String, ApiError>;

    async fn play_round(
        &self,
        session_id: &str,
        at: GameHour,
        decision: &RoundDecision,
    ) -> Result<HourOutcome, ApiError>;

    async fn end_session(&self, session_id: &str) -> Result<HourOutcome, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_order_is_fixed() {
        assert_eq!(CLASSES[0], Class::First);
        assert_eq!(CLASSES[3], Class::Economy);
        assert_eq!(Class::PremiumEconomy.index(), 2);
        assert_eq!(Class::PremiumEconomy.wire_name(), "premiumEconomy");
        assert_eq!(Class::Business.to_string(), "BUSINESS");
    }

    #[test]
    fn class_vec_arithmetic() {
        let a = ClassVec([1, 2, 3, 4]);
        let b = ClassVec([4, 3, 2, 1]);
        assert_eq!((a + b).total(), 20);
        assert_eq!((a - b).0, [-3, -1, 1, 3]);
        assert_eq!((a - b).deficit(), 4);
        assert_eq!((a - b).clamp_min_zero().0, [0, 0, 1, 3]);
        assert_eq!(a.min(&b).0, [1, 2, 2, 1]);
        assert_eq!(a.excess_over(&ClassVec::splat(2)), 3);
    }

    #[test]
    fn money_dot_product() {
        let rates = ClassMoney([50.0, 30.0, 15.0, 10.0]);
        let counts = ClassVec([1, 0, 2, 10]);
        assert_eq!(rates.dot(&counts), 50.0 + 30.0 + 100.0);
    }

    #[test]
    fn game_hour_round_trips_day_and_hour() {
        let h = GameHour::from_day_hour(3, 7);
        assert_eq!(h.0, 79);
        assert_eq!(h.day(), 3);
        assert_eq!(h.hour_of_day(), 7);
        assert_eq!((h + 17).day(), 4);
        assert_eq!(h.to_string(), "d3h07");
    }

    #[test]
    fn checked_in_actuals_override_plan() {
        let mut flight = Flight {
            id: "F1".to_string(),
            number: "KR100".to_string(),
            origin: "HUB".to_string(),
            destination: "OUT".to_string(),
            scheduled_departure: GameHour(5),
            scheduled_arrival: GameHour(9),
            aircraft_type: "A320".to_string(),
            distance: 500.0,
            planned_passengers: ClassVec([1, 3, 2, 8]),
            actual_passengers: Some(ClassVec([2, 2, 2, 9])),
            actual_distance: Some(512.0),
            phase: FlightPhase::Announced,
        };
        assert_eq!(flight.expected_passengers(), ClassVec([1, 3, 2, 8]));
        assert_eq!(flight.effective_distance(), 500.0);
        flight.phase = FlightPhase::CheckedIn;
        assert_eq!(flight.expected_passengers(), ClassVec([2, 2, 2, 9]));
        assert_eq!(flight.effective_distance(), 512.0);
    }

    #[test]
    fn movement_sort_key_orders_within_tick() {
        let purchase = KitMovement::PurchaseDelivery {
            ready_hour: GameHour(10),
            quantities: ClassVec::splat(1),
        };
        let processing = KitMovement::Processing {
            airport: "OUT".to_string(),
            ready_hour: GameHour(10),
            quantities: ClassVec::splat(1),
        };
        let arrival = KitMovement::InTransit {
            flight_id: "F1".to_string(),
            destination: "OUT".to_string(),
            arrive_hour: GameHour(10),
            quantities: ClassVec::splat(1),
        };
        let mut queue = vec![arrival.clone(), processing.clone(), purchase.clone()];
        queue.sort_by_key(KitMovement::sort_key);
        assert_eq!(queue, vec![purchase, processing, arrival]);
    }

    #[test]
    fn movement_json_round_trip() {
        let movement = KitMovement::InTransit {
            flight_id: "F9".to_string(),
            destination: "OUT".to_string(),
            arrive_hour: GameHour(42),
            quantities: ClassVec([0, 1, 0, 7]),
        };
        let raw = serde_json::to_string(&movement).expect("serialize");
        let parsed: KitMovement = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(parsed, movement);
    }
}
