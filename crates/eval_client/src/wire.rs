//! Wire shapes of the evaluation platform (camelCase JSON) and their
//! conversions to and from the domain types. Nothing outside this crate
//! sees these structs.

use serde::{Deserialize, Serialize};

use core_types::{
    Class, ClassVec, Flight, FlightEvent, FlightEventKind, FlightPhase, GameHour, PenaltyNotice,
    RoundDecision,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerClassAmount {
    #[serde(default)]
    pub first: i64,
    #[serde(default)]
    pub business: i64,
    #[serde(default)]
    pub premium_economy: i64,
    #[serde(default)]
    pub economy: i64,
}

impl From<ClassVec> for PerClassAmount {
    fn from(v: ClassVec) -> Self {
        Self {
            first: v[Class::First],
            business: v[Class::Business],
            premium_economy: v[Class::PremiumEconomy],
            economy: v[Class::Economy],
        }
    }
}

impl From<PerClassAmount> for ClassVec {
    fn from(v: PerClassAmount) -> Self {
        ClassVec([v.first, v.business, v.premium_economy, v.economy])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHour {
    #[serde(default)]
    pub day: i64,
    #[serde(default)]
    pub hour: i64,
}

impl From<DayHour> for GameHour {
    fn from(v: DayHour) -> Self {
        GameHour::from_day_hour(v.day, v.hour)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightLoadDto {
    pub flight_id: String,
    pub loaded_kits: PerClassAmount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRoundRequest {
    pub day: i64,
    pub hour: i64,
    pub flight_loads: Vec<FlightLoadDto>,
    pub kit_purchasing_orders: PerClassAmount,
}

impl PlayRoundRequest {
    pub fn from_decision(at: GameHour, decision: &RoundDecision) -> Self {
        Self {
            day: at.day(),
            hour: at.hour_of_day(),
            flight_loads: decision
                .loads
                .iter()
                .map(|(flight_id, kits)| FlightLoadDto {
                    flight_id: flight_id.clone(),
                    loaded_kits: (*kits).into(),
                })
                .collect(),
            kit_purchasing_orders: decision.purchases.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightEventDto {
    pub event_type: String,
    pub flight_id: String,
    #[serde(default)]
    pub flight_number: String,
    pub origin_airport: String,
    pub destination_airport: String,
    #[serde(default)]
    pub departure: DayHour,
    #[serde(default)]
    pub arrival: DayHour,
    #[serde(default)]
    pub passengers: PerClassAmount,
    #[serde(default)]
    pub aircraft_type: String,
    #[serde(default)]
    pub distance: f64,
}

impl FlightEventDto {
    /// Unknown event types are tolerated as `None`; the caller logs them.
    pub fn into_domain(self) -> Option<FlightEvent> {
        let kind = match self.event_type.as_str() {
            "SCHEDULED" => FlightEventKind::Scheduled,
            "CHECKED_IN" => FlightEventKind::CheckedIn,
            "LANDED" => FlightEventKind::Landed,
            _ => return None,
        };
        let passengers: ClassVec = self.passengers.into();
        // At check-in the reported passenger counts and distance are the
        // actuals; at landing the distance is the flown one.
        let (actual_passengers, actual_distance) = match kind {
            FlightEventKind::Scheduled => (None, None),
            FlightEventKind::CheckedIn => (Some(passengers), Some(self.distance)),
            FlightEventKind::Landed => (Some(passengers), Some(self.distance)),
        };
        Some(FlightEvent {
            kind,
            flight: Flight {
                id: self.flight_id,
                number: self.flight_number,
                origin: self.origin_airport,
                destination: self.destination_airport,
                scheduled_departure: self.departure.into(),
                scheduled_arrival: self.arrival.into(),
                aircraft_type: self.aircraft_type,
                distance: self.distance,
                planned_passengers: passengers,
                actual_passengers,
                actual_distance,
                phase: FlightPhase::Announced,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyDto {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub flight_id: Option<String>,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub issued_day: i64,
    #[serde(default)]
    pub issued_hour: i64,
    #[serde(default)]
    pub penalty: f64,
    #[serde(default)]
    pub reason: String,
}

impl From<PenaltyDto> for PenaltyNotice {
    fn from(dto: PenaltyDto) -> Self {
        Self {
            code: dto.code,
            flight_id: dto.flight_id,
            flight_number: dto.flight_number,
            issued: GameHour::from_day_hour(dto.issued_day, dto.issued_hour),
            amount: dto.penalty,
            reason: dto.reason,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourResponseDto {
    #[serde(default)]
    pub day: i64,
    #[serde(default)]
    pub hour: i64,
    #[serde(default)]
    pub flight_updates: Vec<FlightEventDto>,
    #[serde(default)]
    pub penalties: Vec<PenaltyDto>,
    #[serde(default)]
    pub total_cost: f64,
}
