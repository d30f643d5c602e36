//! Cost and penalty model. Pure functions over plain data; the single
//! source of truth for the optimizer's objective. Any change to the
//! evaluation platform's scoring lands here and nowhere else.

use serde::{Deserialize, Serialize};

use core_types::{AircraftType, Airport, Class, ClassVec, KitClassMeta, CLASSES};

/// Scoring factors mirrored from the evaluation platform. Distance-scaled
/// factors multiply the flight distance; the inventory factors are flat
/// per-kit amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyFactors {
    pub negative_inventory: f64,
    pub over_capacity: f64,
    pub flight_overload_per_distance: f64,
    pub unfulfilled_per_distance: f64,
    pub incorrect_flight_load: f64,
    pub end_of_game_remaining_stock: f64,
    pub end_of_game_pending_processing: f64,
    pub end_of_game_unfulfilled: f64,
    pub early_end_of_game: f64,
}

impl Default for PenaltyFactors {
    fn default() -> Self {
        Self {
            negative_inventory: 5342.0,
            over_capacity: 777.0,
            flight_overload_per_distance: 5.0,
            unfulfilled_per_distance: 0.003,
            incorrect_flight_load: 5000.0,
            end_of_game_remaining_stock: 0.0013,
            end_of_game_pending_processing: 0.0013,
            end_of_game_unfulfilled: 1.5,
            early_end_of_game: 1000.0,
        }
    }
}

impl PenaltyFactors {
    /// Distance at which one unfulfilled passenger costs as much as the
    /// kit itself: 1 / unfulfilled_per_distance, ~333 km as calibrated.
    pub fn break_even_km(&self) -> f64 {
        1.0 / self.unfulfilled_per_distance
    }
}

#[derive(Debug, Clone)]
pub struct CostModel {
    pub factors: PenaltyFactors,
    pub kit_meta: [KitClassMeta; 4],
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            factors: PenaltyFactors::default(),
            kit_meta: KitClassMeta::standard_set(),
        }
    }
}

impl CostModel {
    pub fn new(factors: PenaltyFactors, kit_meta: [KitClassMeta; 4]) -> Self {
        Self { factors, kit_meta }
    }

    fn meta(&self, class: Class) -> &KitClassMeta {
        &self.kit_meta[class.index()]
    }

    pub fn loading_cost(&self, origin: &Airport, kits: &ClassVec) -> f64 {
        origin.loading_cost.dot(kits)
    }

    pub fn movement_cost(&self, distance: f64, aircraft: &AircraftType, kits: &ClassVec) -> f64 {
        let weight: f64 = CLASSES
            .iter()
            .map(|&c| kits[c] as f64 * self.meta(c).weight_kg)
            .sum();
        distance * aircraft.fuel_cost_per_km * weight
    }

    pub fn processing_cost(&self, destination: &Airport, kits: &ClassVec) -> f64 {
        destination.processing_cost.dot(kits)
    }

    pub fn purchase_cost(&self, order: &ClassVec) -> f64 {
        CLASSES
            .iter()
            .map(|&c| order[c] as f64 * self.meta(c).cost)
            .sum()
    }

    /// Flat per-kit charge for every negative inventory component,
    /// evaluated at hour boundaries.
    pub fn negative_inventory_penalty(&self, inventory: &ClassVec) -> f64 {
        self.factors.negative_inventory * inventory.deficit() as f64
    }

    pub fn overstock_penalty(&self, airport: &Airport, inventory: &ClassVec) -> f64 {
        self.factors.over_capacity * inventory.excess_over(&airport.storage_capacity) as f64
    }

    pub fn overload_penalty(
        &self,
        distance: f64,
        aircraft: &AircraftType,
        kits: &ClassVec,
    ) -> f64 {
        let weighted: f64 = CLASSES
            .iter()
            .map(|&c| {
                let excess = (kits[c] - aircraft.kit_capacity[c]).max(0);
                self.meta(c).cost * excess as f64
            })
            .sum();
        self.factors.flight_overload_per_distance * distance * aircraft.fuel_cost_per_km * weighted
    }

    pub fn unfulfilled_penalty(
        &self,
        distance: f64,
        passengers: &ClassVec,
        kits: &ClassVec,
    ) -> f64 {
        let weighted: f64 = CLASSES
            .iter()
            .map(|&c| {
                let shortfall = (passengers[c] - kits[c]).max(0);
                self.meta(c).cost * shortfall as f64
            })
            .sum();
        self.factors.unfulfilled_per_distance * distance * weighted
    }

    /// Full per-flight objective contribution for a candidate load.
    pub fn flight_objective(
        &self,
        origin: &Airport,
        destination: &Airport,
        aircraft: &AircraftType,
        distance: f64,
        passengers: &ClassVec,
        kits: &ClassVec,
    ) -> f64 {
        self.loading_cost(origin, kits)
            + self.movement_cost(distance, aircraft, kits)
            + self.processing_cost(destination, kits)
            + self.unfulfilled_penalty(distance, passengers, kits)
            + self.overload_penalty(distance, aircraft, kits)
    }

    /// Terminal-phase estimate of the remaining-stock charge. Informational
    /// for the optimizer: it tilts the last hours toward depletion at
    /// outstations, it is not part of the per-round objective.
    pub fn terminal_stock_penalty(&self, inventory: &ClassVec) -> f64 {
        let value: f64 = CLASSES
            .iter()
            .map(|&c| inventory[c].max(0) as f64 * self.meta(c).cost)
            .sum();
        self.factors.end_of_game_remaining_stock * value
    }

    pub fn terminal_pending_penalty(&self, pending: &ClassVec) -> f64 {
        let value: f64 = CLASSES
            .iter()
            .map(|&c| pending[c].max(0) as f64 * self.meta(c).cost)
            .sum();
        self.factors.end_of_game_pending_processing * value
    }
}
