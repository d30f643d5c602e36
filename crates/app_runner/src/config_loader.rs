//! Engine configuration. Every value has a compiled default; the optional
//! `configs/engine.toml` overrides single keys per section. The file is
//! flat key = value lines under [section] headers, parsed without pulling
//! a TOML dependency into the runtime (the test suite cross-checks the
//! parser against a real TOML parser).

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use cost_model::PenaltyFactors;
use horizon_view::HorizonConfig;
use strategy_genetic::GeneticConfig;
use strategy_greedy::GreedyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub total_rounds: i64,
    pub round_budget_ms: u64,
    pub optimize_budget_ms: u64,
    pub seed: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            total_rounds: core_types::TOTAL_ROUNDS,
            round_budget_ms: 5_000,
            optimize_budget_ms: 2_000,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub runner: RunnerConfig,
    pub horizon: HorizonConfig,
    pub genetic: GeneticConfig,
    pub greedy: GreedyConfig,
    pub penalties: PenaltyFactors,
}

fn config_path() -> PathBuf {
    std::env::var("KITROTOR_CONFIG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configs/engine.toml"))
}

pub fn load_engine_config() -> EngineConfig {
    let path = config_path();
    match fs::read_to_string(&path) {
        Ok(raw) => parse_engine_config(&raw),
        Err(_) => EngineConfig::default(),
    }
}

pub(crate) fn parse_engine_config(raw: &str) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let mut section = String::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_string();
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        let val = v.trim().trim_matches('"');
        match section.as_str() {
            "runner" => match key {
                "total_rounds" => set(val, &mut cfg.runner.total_rounds),
                "round_budget_ms" => set(val, &mut cfg.runner.round_budget_ms),
                "optimize_budget_ms" => set(val, &mut cfg.runner.optimize_budget_ms),
                "seed" => set(val, &mut cfg.runner.seed),
                _ => {}
            },
            "horizon" => match key {
                "load_window_hours" => set(val, &mut cfg.horizon.load_window_hours),
                "purchase_window_hours" => set(val, &mut cfg.horizon.purchase_window_hours),
                _ => {}
            },
            "genetic" => match key {
                "population_size" => set(val, &mut cfg.genetic.population_size),
                "max_generations" => set(val, &mut cfg.genetic.max_generations),
                "tournament_size" => set(val, &mut cfg.genetic.tournament_size),
                "crossover_rate" => set(val, &mut cfg.genetic.crossover_rate),
                "mutation_rate" => set(val, &mut cfg.genetic.mutation_rate),
                "elitism" => set(val, &mut cfg.genetic.elitism),
                "no_improvement_limit" => set(val, &mut cfg.genetic.no_improvement_limit),
                _ => {}
            },
            "greedy" => match key {
                "break_even_km" => set(val, &mut cfg.greedy.break_even_km),
                "shortfall_cover" => set(val, &mut cfg.greedy.shortfall_cover),
                "topup_ratio" => set(val, &mut cfg.greedy.topup_ratio),
                "topup_window_hours" => set(val, &mut cfg.greedy.topup_window_hours),
                _ => {}
            },
            "penalties" => match key {
                "negative_inventory" => set(val, &mut cfg.penalties.negative_inventory),
                "over_capacity" => set(val, &mut cfg.penalties.over_capacity),
                "flight_overload_per_distance" => {
                    set(val, &mut cfg.penalties.flight_overload_per_distance)
                }
                "unfulfilled_per_distance" => {
                    set(val, &mut cfg.penalties.unfulfilled_per_distance)
                }
                "incorrect_flight_load" => set(val, &mut cfg.penalties.incorrect_flight_load),
                "end_of_game_remaining_stock" => {
                    set(val, &mut cfg.penalties.end_of_game_remaining_stock)
                }
                "end_of_game_pending_processing" => {
                    set(val, &mut cfg.penalties.end_of_game_pending_processing)
                }
                "end_of_game_unfulfilled" => {
                    set(val, &mut cfg.penalties.end_of_game_unfulfilled)
                }
                "early_end_of_game" => set(val, &mut cfg.penalties.early_end_of_game),
                _ => {}
            },
            _ => {}
        }
    }
    cfg
}

fn set<T: std::str::FromStr>(val: &str, slot: &mut T) {
    if let Ok(parsed) = val.parse::<T>() {
        *slot = parsed;
    }
}
