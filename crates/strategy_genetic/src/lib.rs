//! Population-based per-hour decision optimizer.
//!
//! Each individual encodes the full (loads, purchases) tuple for the
//! current horizon. Fitness simulates the mirror forward over the purchase
//! window and prices the result with the cost model. The deterministic
//! greedy baseline is injected every generation, so the returned decision
//! is never worse than the baseline under the model. Identical snapshot
//! and seed reproduce identical output.

mod fitness;
mod operators;

use std::collections::BTreeMap;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use core_types::{AircraftType, Airport, ClassVec, KitClassMeta, RoundDecision};
use cost_model::CostModel;
use horizon_view::HorizonView;
use state_mirror::MirrorState;
use strategy_greedy::{GreedyConfig, GreedyPlanner};

pub use fitness::evaluate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub elitism: usize,
    pub no_improvement_limit: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 45,
            max_generations: 200,
            tournament_size: 4,
            crossover_rate: 0.82,
            mutation_rate: 0.15,
            elitism: 3,
            no_improvement_limit: 12,
        }
    }
}

/// Read-only inputs for one optimization call. The mirror is the caller's
/// snapshot; nothing here is mutated.
pub struct OptimizeContext<'a> {
    pub mirror: &'a MirrorState,
    pub view: &'a HorizonView,
    pub airports: &'a BTreeMap<String, Airport>,
    pub aircraft: &'a BTreeMap<String, AircraftType>,
    pub hub: Option<&'a Airport>,
    pub cost: &'a CostModel,
    pub kit_meta: &'a [KitClassMeta; 4],
}

/// Candidate solution: one load vector per loadable flight (parallel to
/// `view.loadable`) plus the aggregate purchase order.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub loads: Vec<ClassVec>,
    pub purchases: ClassVec,
    pub fitness: f64,
}

impl Individual {
    fn new(loads: Vec<ClassVec>, purchases: ClassVec) -> Self {
        Self {
            loads,
            purchases,
            fitness: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneticOptimizer {
    cfg: GeneticConfig,
    greedy: GreedyPlanner,
}

impl GeneticOptimizer {
    pub fn new(cfg: GeneticConfig, greedy_cfg: GreedyConfig) -> Self {
        Self {
            cfg,
            greedy: GreedyPlanner::new(greedy_cfg),
        }
    }

    /// Produce the round decision. Never fails: on an empty horizon the
    /// purchases-only decision is returned, on deadline the best incumbent
    /// so far.
    pub fn optimize(&self, ctx: &OptimizeContext, seed: u64, deadline: Instant) -> RoundDecision {
        let anchor = self.anchor(ctx);
        if ctx.view.loadable.is_empty() {
            return individual_to_decision(ctx, &anchor);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut population = self.initial_population(ctx, &mut rng, &anchor);
        for individual in &mut population {
            individual.fitness = evaluate(ctx, individual);
        }
        sort_population(&mut population);

        let mut best = population[0].clone();
        let mut stale_generations = 0usize;
        let mut generation = 0usize;

        while generation < self.cfg.max_generations
            && stale_generations < self.cfg.no_improvement_limit
            && Instant::now() < deadline
        {
            let mut next = Vec::with_capacity(self.cfg.population_size);
            for elite in population.iter().take(self.cfg.elitism) {
                next.push(elite.clone());
            }
            // The greedy anchor re-enters every generation so the output
            // can never drift below the baseline.
            let mut anchor_entry = anchor.clone();
            anchor_entry.fitness = evaluate(ctx, &anchor_entry);
            next.push(anchor_entry);

            while next.len() < self.cfg.population_size {
                if Instant::now() >= deadline {
                    break;
                }
                let p1 = operators::tournament(&population, self.cfg.tournament_size, &mut rng);
                let p2 = operators::tournament(&population, self.cfg.tournament_size, &mut rng);
                let (mut c1, mut c2) = if rng.gen::<f64>() < self.cfg.crossover_rate {
                    operators::crossover(p1, p2, &mut rng)
                } else {
                    (p1.clone(), p2.clone())
                };
                operators::mutate(&mut c1, self.cfg.mutation_rate, &mut rng);
                operators::mutate(&mut c2, self.cfg.mutation_rate, &mut rng);
                operators::repair(ctx, &mut c1);
                operators::repair(ctx, &mut c2);
                c1.fitness = evaluate(ctx, &c1);
                c2.fitness = evaluate(ctx, &c2);
                next.push(c1);
                if next.len() < self.cfg.population_size {
                    next.push(c2);
                }
            }

            population = next;
            sort_population(&mut population);
            generation += 1;

            if population[0].fitness + 1e-9 < best.fitness {
                best = population[0].clone();
                stale_generations = 0;
            } else {
                stale_generations += 1;
            }
        }

        tracing::debug!(
            generations = generation,
            fitness = best.fitness,
            loads = best.loads.len(),
            "population search finished"
        );
        individual_to_decision(ctx, &best)
    }

    /// Deterministic greedy baseline, repaired and index-aligned.
    fn anchor(&self, ctx: &OptimizeContext) -> Individual {
        let decision = self.greedy.plan(
            ctx.view,
            ctx.mirror,
            ctx.aircraft,
            ctx.hub,
            ctx.kit_meta,
        );
        let loads = ctx
            .view
            .loadable
            .iter()
            .map(|f| decision.loads.get(&f.id).copied().unwrap_or_default())
            .collect();
        let mut individual = Individual::new(loads, decision.purchases);
        operators::repair(ctx, &mut individual);
        individual
    }

    fn initial_population(
        &self,
        ctx: &OptimizeContext,
        rng: &mut ChaCha8Rng,
        anchor: &Individual,
    ) -> Vec<Individual> {
        let size = self.cfg.population_size.max(4);
        let conservative_n = size * 3 / 10;
        let aggressive_n = size * 3 / 10;
        let random_n = size - conservative_n - aggressive_n - 1;

        let minimal_purchases = self.minimal_purchases(ctx);
        let mut population = Vec::with_capacity(size);
        population.push(anchor.clone());
        for _ in 0..conservative_n {
            population.push(self.seed_individual(ctx, SeedStyle::Conservative, minimal_purchases, rng));
        }
        for _ in 0..aggressive_n {
            population.push(self.seed_individual(ctx, SeedStyle::Aggressive, anchor.purchases, rng));
        }
        for _ in 0..random_n {
            population.push(self.seed_individual(ctx, SeedStyle::Random, anchor.purchases, rng));
        }
        population
    }

    /// Conservative individuals buy with a tighter ladder: shorter window,
    /// lower cover.
    fn minimal_purchases(&self, ctx: &OptimizeContext) -> ClassVec {
        let minimal = GreedyPlanner::new(GreedyConfig {
            shortfall_cover: 1.1,
            topup_ratio: 0.3,
            topup_window_hours: 36,
            ..*self.greedy.cfg()
        });
        minimal.plan_purchases(ctx.view, ctx.mirror, ctx.hub, ctx.kit_meta)
    }

    fn seed_individual(
        &self,
        ctx: &OptimizeContext,
        style: SeedStyle,
        purchases: ClassVec,
        rng: &mut ChaCha8Rng,
    ) -> Individual {
        let loads = ctx
            .view
            .loadable
            .iter()
            .map(|flight| {
                let passengers = flight.expected_passengers();
                ClassVec::from_fn(|c| {
                    let p = passengers[c];
                    if p == 0 {
                        return 0;
                    }
                    match style {
                        SeedStyle::Conservative => p,
                        SeedStyle::Aggressive => {
                            let buffer = match c {
                                core_types::Class::First => 1.10,
                                core_types::Class::Business => 1.08,
                                core_types::Class::PremiumEconomy => 1.05,
                                core_types::Class::Economy => 1.03,
                            };
                            ((p as f64 * buffer) as i64).max(p)
                        }
                        SeedStyle::Random => {
                            let hi = ((p as f64 * 1.10) as i64).max(p);
                            rng.gen_range(p..=hi)
                        }
                    }
                })
            })
            .collect();
        let mut individual = Individual::new(loads, purchases);
        operators::repair(ctx, &mut individual);
        individual
    }
}

#[derive(Debug, Clone, Copy)]
enum SeedStyle {
    Conservative,
    Aggressive,
    Random,
}

fn sort_population(population: &mut [Individual]) {
    population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
}

fn individual_to_decision(ctx: &OptimizeContext, individual: &Individual) -> RoundDecision {
    let mut loads = BTreeMap::new();
    for (flight, kits) in ctx.view.loadable.iter().zip(&individual.loads) {
        if !kits.is_zero() {
            loads.insert(flight.id.clone(), *kits);
        }
    }
    RoundDecision {
        loads,
        purchases: individual.purchases,
    }
}
