//! Round orchestrator: drives one session against the evaluation service.
//!
//! One round = derive horizon, optimize under a hard deadline, validate,
//! submit, fold the response back into the mirror, record. The mirror is
//! only ever mutated from this loop; the optimizer works on a snapshot in
//! a blocking worker and can overrun its budget without stalling the
//! round (an empty decision is submitted instead).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use catalog::Catalog;
use core_types::{
    AircraftType, Airport, ApiError, EvalService, GameHour, HourOutcome, KitClassMeta,
    RoundDecision,
};
use cost_model::CostModel;
use horizon_view::HorizonView;
use state_mirror::MirrorState;
use strategy_genetic::{GeneticOptimizer, OptimizeContext};
use validator::Validator;

use crate::config_loader::EngineConfig;
use crate::summary::{RoundRecord, StatusSummary, SummarySlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Stopping,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

/// Owned snapshot handed to the planning worker; nothing in here aliases
/// the live mirror.
pub struct PlanInputs {
    pub mirror: MirrorState,
    pub view: HorizonView,
    pub airports: BTreeMap<String, Airport>,
    pub aircraft: BTreeMap<String, AircraftType>,
    pub hub_code: Option<String>,
    pub cost: CostModel,
    pub kit_meta: [KitClassMeta; 4],
}

/// Seam for the per-round decision engine. The production planner is the
/// population optimizer; tests substitute misbehaving ones.
pub trait DecisionPlanner: Send + Sync + 'static {
    fn plan(&self, inputs: &PlanInputs, seed: u64, deadline: Instant) -> RoundDecision;
}

impl DecisionPlanner for GeneticOptimizer {
    fn plan(&self, inputs: &PlanInputs, seed: u64, deadline: Instant) -> RoundDecision {
        let hub = inputs
            .hub_code
            .as_ref()
            .and_then(|code| inputs.airports.get(code));
        let ctx = OptimizeContext {
            mirror: &inputs.mirror,
            view: &inputs.view,
            airports: &inputs.airports,
            aircraft: &inputs.aircraft,
            hub,
            cost: &inputs.cost,
            kit_meta: &inputs.kit_meta,
        };
        self.optimize(&ctx, seed, deadline)
    }
}

pub struct Orchestrator<S, P> {
    service: Arc<S>,
    planner: Arc<P>,
    cfg: EngineConfig,
    airports: BTreeMap<String, Airport>,
    aircraft: BTreeMap<String, AircraftType>,
    hub_code: Option<String>,
    kit_meta: [KitClassMeta; 4],
    cost: CostModel,
    validator: Validator,
    mirror: MirrorState,
    slot: Arc<SummarySlot>,
    stop: Arc<AtomicBool>,
    state: RunState,
    session_id: Option<String>,
    round: i64,
    cumulative_loads: i64,
    cumulative_purchases: i64,
    anomalies_total: usize,
    previous_total_cost: f64,
}

impl<S: EvalService, P: DecisionPlanner> Orchestrator<S, P> {
    pub fn new(
        service: Arc<S>,
        planner: Arc<P>,
        catalog: &Catalog,
        cfg: EngineConfig,
        slot: Arc<SummarySlot>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let airports: BTreeMap<String, Airport> = catalog
            .all_airports()
            .map(|a| (a.code.clone(), a.clone()))
            .collect();
        let aircraft: BTreeMap<String, AircraftType> = catalog
            .all_aircraft()
            .map(|a| (a.code.clone(), a.clone()))
            .collect();
        let hub_code = Some(catalog.hub().code.clone());
        let kit_meta = [
            *catalog.kit_meta(core_types::Class::First),
            *catalog.kit_meta(core_types::Class::Business),
            *catalog.kit_meta(core_types::Class::PremiumEconomy),
            *catalog.kit_meta(core_types::Class::Economy),
        ];
        let cost = CostModel::new(cfg.penalties, kit_meta);
        let mirror = MirrorState::new(GameHour(0), airports.values());

        Self {
            service,
            planner,
            cfg,
            airports,
            aircraft,
            hub_code,
            kit_meta,
            cost,
            validator: Validator,
            mirror,
            slot,
            stop,
            state: RunState::Idle,
            session_id: None,
            round: 0,
            cumulative_loads: 0,
            cumulative_purchases: 0,
            anomalies_total: 0,
            previous_total_cost: 0.0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the session to natural completion (or operator stop). The end
    /// call is issued exactly once, in every exit path that got a session.
    pub async fn run(&mut self) -> Result<()> {
        self.state = RunState::Starting;
        self.publish_summary();

        let session_id = match self.service.start_session().await {
            Ok(id) => id,
            Err(err) => {
                self.state = RunState::Failed;
                self.publish_summary();
                return Err(anyhow!("session start failed: {err}"));
            }
        };
        tracing::info!(%session_id, "session started");
        self.session_id = Some(session_id);
        self.state = RunState::Running;
        self.publish_summary();

        let outcome = self.round_loop().await;

        self.state = RunState::Stopping;
        self.publish_summary();
        let session_id = self.session_id.clone().unwrap_or_default();
        match self.service.end_session(&session_id).await {
            Ok(final_outcome) => {
                self.previous_total_cost = final_outcome.total_cost;
                tracing::info!(
                    total_cost = final_outcome.total_cost,
                    penalties = final_outcome.penalties.len(),
                    "session ended"
                );
            }
            Err(err) => tracing::error!(%err, "session end failed"),
        }

        match outcome {
            Ok(()) => {
                self.state = RunState::Done;
                self.publish_summary();
                Ok(())
            }
            Err(err) => {
                self.state = RunState::Failed;
                self.publish_summary();
                Err(err)
            }
        }
    }

    async fn round_loop(&mut self) -> Result<()> {
        while self.round < self.cfg.runner.total_rounds {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!(round = self.round, "operator stop requested");
                break;
            }
            self.play_one_round().await?;
            self.round += 1;
        }
        Ok(())
    }

    async fn play_one_round(&mut self) -> Result<()> {
        let round_start = Instant::now();
        let round_budget = Duration::from_millis(self.cfg.runner.round_budget_ms);
        let at = self.mirror.current_hour();

        let decision = self.optimize_with_budget(round_start, round_budget).await;
        metrics::histogram!("kitrotor_optimize_seconds")
            .record(round_start.elapsed().as_secs_f64());

        let report = self
            .validator
            .validate(&decision, &self.mirror, &self.aircraft, self.hub());
        if !report.is_valid() {
            return Err(anyhow!("validation errors: {:?}", report.errors));
        }
        let decision = report.repaired;

        let session_id = self.session_id.clone().unwrap_or_default();
        let outcome = match self.service.play_round(&session_id, at, &decision).await {
            Ok(outcome) => outcome,
            Err(err @ ApiError::Protocol(_)) => {
                // A 400 is a bug on our side; do not retry the round.
                return Err(anyhow!("round {} rejected: {err}", self.round));
            }
            Err(err) => return Err(anyhow!("round {} failed: {err}", self.round)),
        };

        self.apply_round(at, &decision, &outcome);

        if round_start.elapsed() > round_budget {
            tracing::warn!(
                round = self.round,
                elapsed_ms = round_start.elapsed().as_millis() as u64,
                "round exceeded its budget"
            );
        }
        Ok(())
    }

    /// Optimize on a snapshot in a blocking worker. If the worker ignores
    /// its deadline, the round-budget backstop abandons it and submits an
    /// empty decision; the worker thread finishes in the background.
    async fn optimize_with_budget(
        &self,
        round_start: Instant,
        round_budget: Duration,
    ) -> RoundDecision {
        let view = HorizonView::build(
            &self.mirror,
            &self.cfg.horizon,
            &self.kit_meta,
            self.hub().map(|h| h.processing_hours).unwrap_or_default(),
        );
        let inputs = PlanInputs {
            mirror: self.mirror.clone(),
            view,
            airports: self.airports.clone(),
            aircraft: self.aircraft.clone(),
            hub_code: self.hub_code.clone(),
            cost: self.cost.clone(),
            kit_meta: self.kit_meta,
        };
        let planner = self.planner.clone();
        let seed = self.cfg.runner.seed.wrapping_add(self.round as u64);
        let deadline = round_start + Duration::from_millis(self.cfg.runner.optimize_budget_ms);

        let worker = tokio::task::spawn_blocking(move || planner.plan(&inputs, seed, deadline));
        match tokio::time::timeout(round_budget, worker).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(join_err)) => {
                tracing::error!(%join_err, "planner worker panicked, submitting empty decision");
                RoundDecision::empty()
            }
            Err(_) => {
                tracing::warn!(
                    round = self.round,
                    "planner missed the round budget, submitting empty decision"
                );
                metrics::counter!("kitrotor_optimizer_timeouts").increment(1);
                RoundDecision::empty()
            }
        }
    }

    fn apply_round(&mut self, at: GameHour, decision: &RoundDecision, outcome: &HourOutcome) {
        // Events first so freshly announced flights are known before the
        // load reservations land.
        self.mirror.apply_events(&outcome.events);
        self.mirror.commit_loads(&decision.loads);
        self.mirror.commit_purchase(&decision.purchases, &self.kit_meta);
        self.mirror.advance_to(outcome.at + 1);
        self.mirror.record_totals(outcome.total_cost, &outcome.penalties);

        let anomalies = self.mirror.drain_anomalies();
        self.anomalies_total += anomalies.len();
        self.mirror.drain_violations();

        self.cumulative_loads += decision.loaded_total();
        self.cumulative_purchases += decision.purchases.total();
        let round_cost = outcome.total_cost - self.previous_total_cost;
        self.previous_total_cost = outcome.total_cost;

        metrics::counter!("kitrotor_rounds_played").increment(1);
        metrics::counter!("kitrotor_anomalies").increment(anomalies.len() as u64);
        metrics::gauge!("kitrotor_total_cost").set(outcome.total_cost);

        self.slot.push_round(RoundRecord {
            round: self.round,
            at,
            wall_clock: chrono::Utc::now(),
            loads_submitted: decision.loads.len(),
            kits_loaded: decision.loaded_total(),
            purchases: decision.purchases,
            round_cost,
            penalties: outcome.penalties.clone(),
        });
        self.publish_summary();

        tracing::info!(
            round = self.round,
            at = %at,
            loads = decision.loads.len(),
            kits = decision.loaded_total(),
            purchases = decision.purchases.total(),
            round_cost,
            total_cost = outcome.total_cost,
            "round submitted"
        );
    }

    fn hub(&self) -> Option<&Airport> {
        self.hub_code.as_ref().and_then(|c| self.airports.get(c))
    }

    fn publish_summary(&self) {
        let at = self.mirror.current_hour();
        self.slot.publish(StatusSummary {
            state: self.state.as_str().to_string(),
            round: self.round,
            day: at.day(),
            hour: at.hour_of_day(),
            total_cost: self.mirror.total_cost(),
            cumulative_loads: self.cumulative_loads,
            cumulative_purchases: self.cumulative_purchases,
            anomalies_total: self.anomalies_total,
            recent_penalties: self.mirror.round_penalties().to_vec(),
            inventory: self.mirror.inventories().clone(),
        });
    }
}
