//! Evolutionary operators: tournament selection, crossover, mutation and
//! the feasibility repair that keeps individuals inside aircraft capacity
//! and available inventory.

use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use core_types::{ClassVec, CLASSES, PER_CLASS_API_MAX};

use crate::{Individual, OptimizeContext};

pub(crate) fn tournament<'a>(
    population: &'a [Individual],
    size: usize,
    rng: &mut ChaCha8Rng,
) -> &'a Individual {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..size.max(1) {
        let pick = &population[rng.gen_range(0..population.len())];
        if pick.fitness < best.fitness {
            best = pick;
        }
    }
    best
}

/// Uniform crossover per load gene; purchases copy from either parent or
/// blend, so intermediate order sizes stay reachable.
pub(crate) fn crossover(
    p1: &Individual,
    p2: &Individual,
    rng: &mut ChaCha8Rng,
) -> (Individual, Individual) {
    let mut c1 = p1.clone();
    let mut c2 = p2.clone();
    c1.fitness = f64::INFINITY;
    c2.fitness = f64::INFINITY;

    for i in 0..c1.loads.len().min(c2.loads.len()) {
        for &class in &CLASSES {
            if rng.gen::<bool>() {
                let tmp = c1.loads[i][class];
                c1.loads[i][class] = c2.loads[i][class];
                c2.loads[i][class] = tmp;
            }
        }
    }

    for &class in &CLASSES {
        let a = p1.purchases[class];
        let b = p2.purchases[class];
        let roll = rng.gen::<f64>();
        if roll < 0.33 {
            c1.purchases[class] = a;
            c2.purchases[class] = b;
        } else if roll < 0.66 {
            c1.purchases[class] = b;
            c2.purchases[class] = a;
        } else {
            c1.purchases[class] = (a as f64 * 0.6 + b as f64 * 0.4) as i64;
            c2.purchases[class] = (a as f64 * 0.4 + b as f64 * 0.6) as i64;
        }
    }

    (c1, c2)
}

/// Per-gene integer perturbation: mostly small tweaks, occasionally a
/// jump. Purchases move in coarser steps.
pub(crate) fn mutate(individual: &mut Individual, rate: f64, rng: &mut ChaCha8Rng) {
    for kits in &mut individual.loads {
        for &class in &CLASSES {
            if rng.gen::<f64>() < rate {
                let delta = if rng.gen::<f64>() < 0.80 {
                    rng.gen_range(-3i64..=3)
                } else {
                    rng.gen_range(-10i64..=10)
                };
                kits[class] = (kits[class] + delta).max(0);
            }
        }
    }
    for &class in &CLASSES {
        if rng.gen::<f64>() < rate {
            let delta = if rng.gen::<f64>() < 0.80 {
                rng.gen_range(-8i64..=8)
            } else {
                rng.gen_range(-30i64..=30)
            };
            individual.purchases[class] = (individual.purchases[class] + delta).max(0);
        }
    }
}

/// Clamp an individual to feasibility: loads within aircraft capacity and
/// the origin's remaining inventory (reserved chronologically), purchases
/// within hub storage headroom and the API bound.
pub(crate) fn repair(ctx: &OptimizeContext, individual: &mut Individual) {
    let mut remaining: BTreeMap<&str, ClassVec> = BTreeMap::new();

    // view.loadable is departure-ordered, so walking it in index order
    // reserves inventory chronologically.
    for (flight, kits) in ctx.view.loadable.iter().zip(&mut individual.loads) {
        let capacity = ctx
            .aircraft
            .get(&flight.aircraft_type)
            .map(|a| a.kit_capacity)
            .unwrap_or_default();
        let available = remaining
            .entry(flight.origin.as_str())
            .or_insert_with(|| ctx.mirror.inventory(&flight.origin).clamp_min_zero());
        for &class in &CLASSES {
            let load = kits[class]
                .min(capacity[class])
                .min(available[class])
                .max(0);
            kits[class] = load;
            available[class] -= load;
        }
    }

    match ctx.hub {
        Some(hub) => {
            let stock = ctx.mirror.inventory(&hub.code);
            for &class in &CLASSES {
                let headroom = (hub.storage_capacity[class] - stock[class].max(0)).max(0);
                individual.purchases[class] = individual.purchases[class]
                    .clamp(0, headroom)
                    .min(PER_CLASS_API_MAX);
            }
        }
        None => individual.purchases = ClassVec::ZERO,
    }
}
