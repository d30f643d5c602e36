//! Static network catalog: airports, aircraft types and the flight plan,
//! loaded once from the semicolon-delimited tables.
//!
//! Missing non-key columns fall back to documented defaults (warned, never
//! silent). Missing keys and referential breaks are configuration errors.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use thiserror::Error;

use core_types::{
    AircraftType, Airport, Class, ClassMoney, ClassVec, Flight, FlightPhase, GameHour,
    KitClassMeta, CLASSES,
};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table {table}: {source}")]
    Table {
        table: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("cannot open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("table {table} row {row}: missing key column '{column}'")]
    MissingKey {
        table: &'static str,
        row: usize,
        column: &'static str,
    },
    #[error("no airport is marked as hub")]
    MissingHub,
    #[error("more than one hub: {0} and {1}")]
    DuplicateHub(String, String),
    #[error("flight {flight} references unknown airport {code}")]
    UnknownAirport { flight: String, code: String },
    #[error("flight {flight} references unknown aircraft type {code}")]
    UnknownAircraft { flight: String, code: String },
}

/// Fallbacks applied when a non-key column is absent from the tables.
#[derive(Debug, Clone, Copy)]
pub struct CatalogDefaults {
    pub storage_capacity: i64,
    pub loading_cost: f64,
    pub processing_cost: f64,
    pub processing_hours: i64,
    pub hub_inventory: i64,
    pub outstation_inventory: i64,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            storage_capacity: 100,
            loading_cost: 10.0,
            processing_cost: 5.0,
            processing_hours: 2,
            hub_inventory: 50,
            outstation_inventory: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    airports: BTreeMap<String, Airport>,
    aircraft: BTreeMap<String, AircraftType>,
    schedule: Vec<Flight>,
    kit_meta: [KitClassMeta; 4],
    hub_code: String,
}

impl Catalog {
    /// Load the three tables from a directory holding `airports.csv`,
    /// `aircraft_types.csv` and `flight_plan.csv`.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let open = |name: &str| -> Result<File, CatalogError> {
            let path = dir.join(name);
            File::open(&path).map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })
        };
        Self::from_readers(
            open("airports.csv")?,
            open("aircraft_types.csv")?,
            open("flight_plan.csv")?,
        )
    }

    pub fn from_readers<R1: Read, R2: Read, R3: Read>(
        airports: R1,
        aircraft: R2,
        flight_plan: R3,
    ) -> Result<Self, CatalogError> {
        let airports = parse_airports(airports, &CatalogDefaults::default())?;
        let aircraft = parse_aircraft(aircraft)?;
        let schedule = parse_flight_plan(flight_plan)?;

        let mut hub_code: Option<String> = None;
        for airport in airports.values() {
            if airport.is_hub {
                if let Some(existing) = &hub_code {
                    return Err(CatalogError::DuplicateHub(
                        existing.clone(),
                        airport.code.clone(),
                    ));
                }
                hub_code = Some(airport.code.clone());
            }
        }
        let hub_code = hub_code.ok_or(CatalogError::MissingHub)?;

        for flight in &schedule {
            for code in [&flight.origin, &flight.destination] {
                if !airports.contains_key(code) {
                    return Err(CatalogError::UnknownAirport {
                        flight: flight.id.clone(),
                        code: code.clone(),
                    });
                }
            }
            if !aircraft.contains_key(&flight.aircraft_type) {
                return Err(CatalogError::UnknownAircraft {
                    flight: flight.id.clone(),
                    code: flight.aircraft_type.clone(),
                });
            }
        }

        Ok(Self {
            airports,
            aircraft,
            schedule,
            kit_meta: KitClassMeta::standard_set(),
            hub_code,
        })
    }

    pub fn airport(&self, code: &str) -> Option<&Airport> {
        self.airports.get(code)
    }

    pub fn aircraft(&self, code: &str) -> Option<&AircraftType> {
        self.aircraft.get(code)
    }

    pub fn kit_meta(&self, class: Class) -> &KitClassMeta {
        &self.kit_meta[class.index()]
    }

    pub fn all_airports(&self) -> impl Iterator<Item = &Airport> {
        self.airports.values()
    }

    pub fn all_aircraft(&self) -> impl Iterator<Item = &AircraftType> {
        self.aircraft.values()
    }

    pub fn hub(&self) -> &Airport {
        &self.airports[&self.hub_code]
    }

    pub fn schedule(&self) -> &[Flight] {
        &self.schedule
    }

    /// Starting inventory per airport, for seeding the mirror.
    pub fn initial_inventories(&self) -> BTreeMap<String, ClassVec> {
        self.airports
            .iter()
            .map(|(code, airport)| (code.clone(), airport.initial_inventory))
            .collect()
    }
}

struct Row<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
    missing: Vec<String>,
}

impl<'a> Row<'a> {
    fn new(headers: &'a StringRecord, record: &'a StringRecord) -> Self {
        Self {
            headers,
            record,
            missing: Vec::new(),
        }
    }

    fn raw(&self, column: &str) -> Option<&str> {
        let idx = self
            .headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))?;
        let value = self.record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn key(&self, table: &'static str, row: usize, column: &'static str) -> Result<String, CatalogError> {
        self.raw(column)
            .map(str::to_string)
            .ok_or(CatalogError::MissingKey { table, row, column })
    }

    fn int_or(&mut self, column: &str, default: i64) -> i64 {
        match self.raw(column).and_then(|v| v.parse::<i64>().ok()) {
            Some(v) => v,
            None => {
                self.missing.push(column.to_string());
                default
            }
        }
    }

    fn float_or(&mut self, column: &str, default: f64) -> f64 {
        match self.raw(column).and_then(|v| v.parse::<f64>().ok()) {
            Some(v) => v,
            None => {
                self.missing.push(column.to_string());
                default
            }
        }
    }

    fn bool_or(&mut self, column: &str, default: bool) -> bool {
        match self.raw(column) {
            Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            None => {
                self.missing.push(column.to_string());
                default
            }
        }
    }
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(input)
}

fn parse_airports<R: Read>(
    input: R,
    defaults: &CatalogDefaults,
) -> Result<BTreeMap<String, Airport>, CatalogError> {
    let table = "airports";
    let mut rdr = reader(input);
    let headers = rdr
        .headers()
        .map_err(|source| CatalogError::Table { table, source })?
        .clone();

    let mut airports = BTreeMap::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| CatalogError::Table { table, source })?;
        let mut row = Row::new(&headers, &record);

        let code = row.key(table, i, "code")?;
        let name = row.raw("name").unwrap_or(&code).to_string();
        let is_hub = row.bool_or("is_hub", false);

        let storage_capacity = ClassVec::from_fn(|c| {
            row.int_or(
                &format!("storage_capacity_{}", c.as_str()),
                defaults.storage_capacity,
            )
        });
        let loading_cost = ClassMoney::from_fn(|c| {
            row.float_or(&format!("loading_cost_{}", c.as_str()), defaults.loading_cost)
        });
        let processing_cost = ClassMoney::from_fn(|c| {
            row.float_or(
                &format!("processing_cost_{}", c.as_str()),
                defaults.processing_cost,
            )
        });
        let processing_hours = ClassVec::from_fn(|c| {
            row.int_or(
                &format!("processing_time_{}", c.as_str()),
                defaults.processing_hours,
            )
        });
        let default_inventory = if is_hub {
            defaults.hub_inventory
        } else {
            defaults.outstation_inventory
        };
        let initial_inventory = ClassVec::from_fn(|c| {
            row.int_or(
                &format!("initial_inventory_{}", c.as_str()),
                default_inventory,
            )
        });

        if !row.missing.is_empty() {
            tracing::warn!(
                airport = %code,
                filled = row.missing.len(),
                columns = ?row.missing,
                "airport table missing columns, defaults applied"
            );
        }

        airports.insert(
            code.clone(),
            Airport {
                code,
                name,
                is_hub,
                storage_capacity,
                loading_cost,
                processing_cost,
                processing_hours,
                initial_inventory,
            },
        );
    }
    Ok(airports)
}

fn parse_aircraft<R: Read>(input: R) -> Result<BTreeMap<String, AircraftType>, CatalogError> {
    let table = "aircraft_types";
    let mut rdr = reader(input);
    let headers = rdr
        .headers()
        .map_err(|source| CatalogError::Table { table, source })?
        .clone();

    let mut aircraft = BTreeMap::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| CatalogError::Table { table, source })?;
        let mut row = Row::new(&headers, &record);

        let code = row.key(table, i, "type_code")?;
        let passenger_capacity = ClassVec::from_fn(|c| {
            row.int_or(&format!("passenger_capacity_{}", c.as_str()), 0)
        });
        let kit_capacity =
            ClassVec::from_fn(|c| row.int_or(&format!("kit_capacity_{}", c.as_str()), 0));
        let fuel_cost_per_km = row.float_or("fuel_cost_per_km", 0.5);

        if !row.missing.is_empty() {
            tracing::warn!(
                aircraft = %code,
                columns = ?row.missing,
                "aircraft table missing columns, defaults applied"
            );
        }

        aircraft.insert(
            code.clone(),
            AircraftType {
                code,
                passenger_capacity,
                kit_capacity,
                fuel_cost_per_km,
            },
        );
    }
    Ok(aircraft)
}

fn parse_flight_plan<R: Read>(input: R) -> Result<Vec<Flight>, CatalogError> {
    let table = "flight_plan";
    let mut rdr = reader(input);
    let headers = rdr
        .headers()
        .map_err(|source| CatalogError::Table { table, source })?
        .clone();

    let mut schedule = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| CatalogError::Table { table, source })?;
        let mut row = Row::new(&headers, &record);

        let id = row.key(table, i, "flight_id")?;
        let origin = row.key(table, i, "origin")?;
        let destination = row.key(table, i, "destination")?;
        let number = row.raw("flight_number").unwrap_or(&id).to_string();

        let departure = GameHour::from_day_hour(
            row.int_or("scheduled_departure_day", 0),
            row.int_or("scheduled_departure_hour", 0),
        );
        let arrival = GameHour::from_day_hour(
            row.int_or("scheduled_arrival_day", 0),
            row.int_or("scheduled_arrival_hour", 0),
        );
        let planned_passengers = ClassVec::from_fn(|c| {
            row.int_or(&format!("planned_passengers_{}", c.as_str()), 0)
        });
        let distance = row.float_or("planned_distance", 0.0);
        let aircraft_type = row.raw("aircraft_type").unwrap_or("UNKNOWN").to_string();

        schedule.push(Flight {
            id,
            number,
            origin,
            destination,
            scheduled_departure: departure,
            scheduled_arrival: arrival,
            aircraft_type,
            distance,
            planned_passengers,
            actual_passengers: None,
            actual_distance: None,
            phase: FlightPhase::Announced,
        });
    }
    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AIRPORTS: &str = "\
code;name;is_hub;storage_capacity_FIRST;storage_capacity_BUSINESS;storage_capacity_PREMIUM_ECONOMY;storage_capacity_ECONOMY;initial_inventory_FIRST;initial_inventory_BUSINESS;initial_inventory_PREMIUM_ECONOMY;initial_inventory_ECONOMY
HUB;Central Hub;true;40;60;80;400;10;10;10;50
OUT;Outstation;false;10;20;30;100;2;4;4;20
";

    const AIRCRAFT: &str = "\
type_code;kit_capacity_FIRST;kit_capacity_BUSINESS;kit_capacity_PREMIUM_ECONOMY;kit_capacity_ECONOMY;fuel_cost_per_km
A320;2;5;3;10;0.4
";

    const FLIGHTS: &str = "\
flight_id;flight_number;origin;destination;scheduled_departure_day;scheduled_departure_hour;scheduled_arrival_day;scheduled_arrival_hour;planned_passengers_FIRST;planned_passengers_BUSINESS;planned_passengers_PREMIUM_ECONOMY;planned_passengers_ECONOMY;planned_distance;aircraft_type
F1;KR100;HUB;OUT;0;5;0;9;1;3;2;8;500;A320
";

    fn load() -> Catalog {
        Catalog::from_readers(AIRPORTS.as_bytes(), AIRCRAFT.as_bytes(), FLIGHTS.as_bytes())
            .expect("catalog")
    }

    #[test]
    fn loads_and_resolves_hub() {
        let catalog = load();
        assert_eq!(catalog.hub().code, "HUB");
        assert_eq!(catalog.all_airports().count(), 2);
        assert_eq!(catalog.schedule().len(), 1);
        let f = &catalog.schedule()[0];
        assert_eq!(f.scheduled_departure, GameHour(5));
        assert_eq!(f.scheduled_arrival, GameHour(9));
        assert_eq!(f.planned_passengers, ClassVec([1, 3, 2, 8]));
        assert_eq!(catalog.aircraft("A320").unwrap().kit_capacity, ClassVec([2, 5, 3, 10]));
    }

    #[test]
    fn missing_columns_fall_back_to_defaults() {
        let catalog = load();
        let out = catalog.airport("OUT").unwrap();
        // Loading/processing columns absent from the fixture.
        assert_eq!(out.loading_cost, ClassMoney::splat(10.0));
        assert_eq!(out.processing_cost, ClassMoney::splat(5.0));
        assert_eq!(out.processing_hours, ClassVec::splat(2));
        // Present columns are taken verbatim.
        assert_eq!(out.initial_inventory, ClassVec([2, 4, 4, 20]));
    }

    #[test]
    fn default_inventory_depends_on_hub_flag() {
        let airports = "code;is_hub\nHUB;true\nOUT;false\n";
        let catalog = Catalog::from_readers(
            airports.as_bytes(),
            AIRCRAFT.as_bytes(),
            "flight_id;origin;destination;aircraft_type\n".as_bytes(),
        )
        .expect("catalog");
        assert_eq!(
            catalog.airport("HUB").unwrap().initial_inventory,
            ClassVec::splat(50)
        );
        assert_eq!(
            catalog.airport("OUT").unwrap().initial_inventory,
            ClassVec::splat(20)
        );
    }

    #[test]
    fn rejects_missing_or_duplicated_hub() {
        let no_hub = "code;is_hub\nA;false\nB;false\n";
        let err = Catalog::from_readers(
            no_hub.as_bytes(),
            AIRCRAFT.as_bytes(),
            "flight_id;origin;destination\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::MissingHub));

        let two_hubs = "code;is_hub\nA;true\nB;true\n";
        let err = Catalog::from_readers(
            two_hubs.as_bytes(),
            AIRCRAFT.as_bytes(),
            "flight_id;origin;destination\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateHub(_, _)));
    }

    #[test]
    fn rejects_unknown_references_in_schedule() {
        let flights = "flight_id;origin;destination;aircraft_type\nF1;HUB;NOPE;A320\n";
        let err = Catalog::from_readers(AIRPORTS.as_bytes(), AIRCRAFT.as_bytes(), flights.as_bytes())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAirport { .. }));

        let flights = "flight_id;origin;destination;aircraft_type\nF1;HUB;OUT;B747\n";
        let err = Catalog::from_readers(AIRPORTS.as_bytes(), AIRCRAFT.as_bytes(), flights.as_bytes())
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAircraft { .. }));
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let airports = "name;is_hub\nSomewhere;true\n";
        let err = Catalog::from_readers(
            airports.as_bytes(),
            AIRCRAFT.as_bytes(),
            "flight_id;origin;destination\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::MissingKey { column: "code", .. }));
    }
}
