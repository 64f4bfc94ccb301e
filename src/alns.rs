//! Adaptive Large Neighborhood Search engine (§4.5).
//!
//! Owns the roulette-wheel operator selection, simulated-annealing
//! acceptance, segment-wise weight adaptation, and fingerprint-based
//! duplicate suppression that make up the ALNS iteration.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::PdptwError;
use crate::model::ProblemInstance;
use crate::destroy;
use crate::repair;
use crate::solution::Solution;

/// Floor applied to every operator weight so a never-used operator never
/// starves to zero (§4.5 step 7). Distinct from `Parameters::epsilon`, which
/// sizes the `q` draw range.
const EPSILON_W: f64 = 1e-8;

/// Cap on the accepted-fingerprint set; cleared wholesale once reached
/// (§4.5: "a bounded memory bound, not a correctness requirement").
const FINGERPRINT_CAP: usize = 25_000;

/// One destroy operator, chosen by name so the engine can dispatch without
/// a trait object per call (the operator set is fixed and small).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestroyKind {
    Random,
    Worst,
    Shaw,
}

const DESTROY_KINDS: [DestroyKind; 3] = [DestroyKind::Random, DestroyKind::Worst, DestroyKind::Shaw];

/// One repair operator. Regret-k is parameterized by `k`; `RegretM` uses
/// `k = num_vehicles` (§4.4: "k ∈ {2,3,4,m}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepairKind {
    Greedy,
    Regret2,
    Regret3,
    Regret4,
    RegretM,
}

const REPAIR_KINDS: [RepairKind; 5] = [
    RepairKind::Greedy,
    RepairKind::Regret2,
    RepairKind::Regret3,
    RepairKind::Regret4,
    RepairKind::RegretM,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoiseKind {
    Off,
    On,
}

const NOISE_KINDS: [NoiseKind; 2] = [NoiseKind::Off, NoiseKind::On];

/// Roulette-wheel weight/usage/reward bookkeeping for one class of
/// operators (destroy, repair, or noise).
struct OperatorClass {
    weights: Vec<f64>,
    usage: Vec<u32>,
    reward: Vec<f64>,
}

impl OperatorClass {
    fn new(n: usize, initial_weight: f64) -> Self {
        Self {
            weights: vec![initial_weight; n],
            usage: vec![0; n],
            reward: vec![0.0; n],
        }
    }

    /// Weighted roulette-wheel draw; falls back to a uniform draw if every
    /// weight is `<= 0` (§4.5 step 2).
    fn select(&mut self, rng: &mut impl Rng) -> usize {
        let total: f64 = self.weights.iter().sum();
        let idx = if total <= 0.0 {
            rng.random_range(0..self.weights.len())
        } else {
            let draw = rng.random_range(0.0..total);
            let mut cumulative = 0.0;
            let mut chosen = self.weights.len() - 1;
            for (i, &w) in self.weights.iter().enumerate() {
                cumulative += w;
                if draw < cumulative {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        self.usage[idx] += 1;
        idx
    }

    fn credit(&mut self, idx: usize, reward: f64) {
        self.reward[idx] += reward;
    }

    /// `w_i <- max(eps, (1-r)*w_i + r*(reward_i/usage_i))` for used
    /// operators; unused operators keep their current weight, floored.
    /// Resets all reward/usage accumulators (§4.5 step 7).
    fn update_weights(&mut self, r: f64) {
        for i in 0..self.weights.len() {
            if self.usage[i] > 0 {
                let avg_reward = self.reward[i] / self.usage[i] as f64;
                self.weights[i] = ((1.0 - r) * self.weights[i] + r * avg_reward).max(EPSILON_W);
            } else {
                self.weights[i] = self.weights[i].max(EPSILON_W);
            }
        }
        self.usage.iter_mut().for_each(|u| *u = 0);
        self.reward.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Persistent engine state threaded across ALNS calls within one run of the
/// two-stage driver (§4.5, §9: per-run state, not a process-global).
pub struct AlnsEngine {
    temperature: f64,
    destroy_class: OperatorClass,
    repair_class: OperatorClass,
    noise_class: OperatorClass,
    accepted_fingerprints: BTreeSet<u64>,
}

/// Outcome of one `run_budget` call.
pub struct AlnsReport {
    pub best: Solution,
    pub iterations_run: u32,
}

impl AlnsEngine {
    /// Builds a fresh engine seeded from `initial_solution`'s
    /// `objectiveSansBank`. Fails fast if that objective is not positive,
    /// since `T0` would otherwise be undefined or non-positive (§4.5).
    pub fn new(instance: &ProblemInstance, initial_solution: &Solution) -> Result<Self, PdptwError> {
        let params = instance.parameters();
        let objective_sans_bank = initial_solution.objective_sans_bank(instance);
        if objective_sans_bank <= 0.0 {
            return Err(PdptwError::state_violation(
                "AlnsEngine::new: objectiveSansBank(s0) must be > 0 to define T0",
            ));
        }
        let t0 = -params.w * objective_sans_bank / params.annealing_p.ln();
        if !t0.is_finite() || t0 <= 0.0 {
            return Err(PdptwError::state_violation(format!(
                "AlnsEngine::new: computed non-positive or non-finite T0={t0}"
            )));
        }

        Ok(Self {
            temperature: t0,
            destroy_class: OperatorClass::new(DESTROY_KINDS.len(), params.initial_weight),
            repair_class: OperatorClass::new(REPAIR_KINDS.len(), params.initial_weight),
            noise_class: OperatorClass::new(NOISE_KINDS.len(), params.initial_weight),
            accepted_fingerprints: BTreeSet::new(),
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn apply_destroy(
        &self,
        kind: DestroyKind,
        instance: &ProblemInstance,
        solution: &mut Solution,
        q: usize,
        rng: &mut impl Rng,
    ) {
        match kind {
            DestroyKind::Random => destroy::random_removal(instance, solution, q, rng),
            DestroyKind::Worst => destroy::worst_removal(instance, solution, q, rng),
            DestroyKind::Shaw => destroy::shaw_removal(instance, solution, q, rng),
        }
    }

    fn apply_repair(
        &self,
        kind: RepairKind,
        instance: &ProblemInstance,
        solution: &mut Solution,
        q: usize,
        noise: bool,
        rng: &mut impl Rng,
    ) {
        let m = instance.num_vehicles();
        match kind {
            RepairKind::Greedy => repair::greedy_insertion(instance, solution, q, noise, rng),
            RepairKind::Regret2 => repair::regret_insertion(instance, solution, q, 2.min(m.max(1)), noise, rng),
            RepairKind::Regret3 => repair::regret_insertion(instance, solution, q, 3.min(m.max(1)), noise, rng),
            RepairKind::Regret4 => repair::regret_insertion(instance, solution, q, 4.min(m.max(1)), noise, rng),
            RepairKind::RegretM => repair::regret_insertion(instance, solution, q, m.max(1), noise, rng),
        }
    }

    /// Runs up to `iterations` ALNS steps against `current`, returning the
    /// best solution found (starting from `current` itself) and the actual
    /// iteration count. If `stop_when_all_assigned`, returns as soon as the
    /// best-known solution's request bank is empty (§4.5 step 9; used by
    /// Phase B of the two-stage driver).
    pub fn run_budget(
        &mut self,
        instance: &ProblemInstance,
        current: Solution,
        iterations: u32,
        stop_when_all_assigned: bool,
        rng: &mut StdRng,
    ) -> Result<AlnsReport, PdptwError> {
        let params = instance.parameters();
        let mut s = current;
        let mut best = s.clone();
        let mut best_objective = best.objective(instance);

        let q_lo = params.remove_lower_bound as usize;
        let q_hi_candidate = ((params.epsilon * instance.num_requests() as f64).floor() as usize)
            .min(params.remove_upper_bound as usize);
        let q_hi = q_hi_candidate.max(q_lo);
        if q_hi < q_lo || q_lo < 1 {
            return Err(PdptwError::state_violation(format!(
                "AlnsEngine::run_budget: require qHi >= qLo >= 1, got qLo={q_lo} qHi={q_hi}"
            )));
        }

        let mut iterations_run = 0u32;

        for _ in 0..iterations {
            iterations_run += 1;

            let q = if q_hi > q_lo {
                rng.random_range(q_lo..=q_hi)
            } else {
                q_lo
            };

            let destroy_idx = self.destroy_class.select(rng);
            let repair_idx = self.repair_class.select(rng);
            let noise_idx = self.noise_class.select(rng);
            let destroy_kind = DESTROY_KINDS[destroy_idx];
            let repair_kind = REPAIR_KINDS[repair_idx];
            let noise_on = NOISE_KINDS[noise_idx] == NoiseKind::On;

            let mut candidate = s.clone();
            self.apply_destroy(destroy_kind, instance, &mut candidate, q, rng);
            self.apply_repair(repair_kind, instance, &mut candidate, q, noise_on, rng);

            let fp = candidate.fingerprint();
            if self.accepted_fingerprints.contains(&fp) {
                // §4.5 step 4: discard, increment the iteration counter, continue.
                // Cooling (step 8) and the early-stop check (step 9) belong to a
                // completed iteration, not a discarded duplicate.
                continue;
            }

            let candidate_objective = candidate.objective(instance);
            let current_objective = s.objective(instance);

            let (accept, reward) = if candidate_objective < best_objective {
                (true, Some(params.reward_adds.0 as f64))
            } else if candidate_objective <= current_objective {
                (true, Some(params.reward_adds.1 as f64))
            } else {
                let delta = candidate_objective - current_objective;
                let accept_prob = (-delta / self.temperature).exp();
                if rng.random_range(0.0..1.0) < accept_prob {
                    (true, Some(params.reward_adds.2 as f64))
                } else {
                    (false, None)
                }
            };

            if let Some(reward) = reward {
                self.destroy_class.credit(destroy_idx, reward);
                self.repair_class.credit(repair_idx, reward);
                self.noise_class.credit(noise_idx, reward);
            }

            if candidate_objective < best_objective {
                best = candidate.clone();
                best_objective = candidate_objective;
            }
            if accept {
                self.accepted_fingerprints.insert(fp);
                if self.accepted_fingerprints.len() > FINGERPRINT_CAP {
                    self.accepted_fingerprints.clear();
                }
                s = candidate;
            }

            if iterations_run % params.segment_num.max(1) == 0 {
                self.destroy_class.update_weights(params.r);
                self.repair_class.update_weights(params.r);
                self.noise_class.update_weights(params.r);
            }

            self.cool(params.c_cool);

            if stop_when_all_assigned && best.request_bank().is_empty() {
                return Ok(AlnsReport { best, iterations_run });
            }
        }

        Ok(AlnsReport { best, iterations_run })
    }

    fn cool(&mut self, c_cool: f64) {
        self.temperature = (self.temperature * c_cool).max(1e-10);
    }
}

// Re-exported so `repair::UNLIMITED` stays reachable from callers that only
// import `alns` (the regret operators' sentinel is part of the engine's
// public contract via cost-table semantics).
pub use repair::UNLIMITED as REPAIR_UNLIMITED;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, Parameters, Request, Vehicle};
    use rand::SeedableRng;
    use std::collections::BTreeSet as Set;

    fn depot() -> Node {
        Node::new(0, 0.0, 0.0, 0.0, 1000.0, 0.0, 0)
    }

    fn build_instance() -> ProblemInstance {
        let nodes = vec![
            depot(),
            Node::new(1, 10.0, 0.0, 0.0, 500.0, 5.0, 10),
            Node::new(2, 20.0, 0.0, 0.0, 600.0, 5.0, -10),
            Node::new(3, 30.0, 0.0, 0.0, 500.0, 5.0, 15),
            Node::new(4, 40.0, 0.0, 0.0, 600.0, 5.0, -15),
            Node::new(5, 50.0, 0.0, 0.0, 500.0, 5.0, 8),
            Node::new(6, 60.0, 0.0, 0.0, 700.0, 5.0, -8),
            depot().with_id(7),
            depot().with_id(8),
        ];
        let vehicles = vec![Vehicle::new(0, 50, 1.0, 7, 8)];
        let compat: Set<usize> = [0].into_iter().collect();
        let requests = vec![
            Request::new(0, 1, 2, 10, compat.clone()),
            Request::new(1, 3, 4, 15, compat.clone()),
            Request::new(2, 5, 6, 8, compat),
        ];
        ProblemInstance::new(nodes, depot(), requests, vehicles, Parameters::default())
            .expect("valid instance")
    }

    fn fully_assigned(instance: &ProblemInstance) -> Solution {
        let mut sol = Solution::empty(instance);
        for r in 0..instance.num_requests() {
            sol.insert_optimal_into_vehicle(instance, r, 0).unwrap();
        }
        sol
    }

    #[test]
    fn t0_is_positive_for_a_valid_initial_solution() {
        let inst = build_instance();
        let sol = fully_assigned(&inst);
        let engine = AlnsEngine::new(&inst, &sol).expect("engine constructs");
        assert!(engine.temperature() > 0.0);
    }

    #[test]
    fn t0_fails_fast_on_zero_objective() {
        let inst = build_instance();
        let empty = Solution::empty(&inst);
        // An empty solution with no assigned requests still has gama*bank > 0,
        // but a zero-request instance would trip the `<= 0` guard; simulate by
        // checking the guard logic directly on a degenerate case instead.
        let _ = empty;
        let nodes = vec![depot(), depot().with_id(1), depot().with_id(2)];
        let vehicles = vec![Vehicle::new(0, 10, 1.0, 1, 2)];
        let degenerate = ProblemInstance::new(nodes, depot(), vec![], vehicles, Parameters::default())
            .expect("valid instance");
        let sol = Solution::empty(&degenerate);
        assert!(AlnsEngine::new(&degenerate, &sol).is_err());
    }

    #[test]
    fn run_budget_never_increases_best_objective() {
        let inst = build_instance();
        let sol = fully_assigned(&inst);
        let before = sol.objective(&inst);
        let mut engine = AlnsEngine::new(&inst, &sol).unwrap();
        let mut rng = StdRng::seed_from_u64(123);
        let report = engine.run_budget(&inst, sol, 200, false, &mut rng).unwrap();
        assert!(report.best.objective(&inst) <= before + 1e-9);
    }

    #[test]
    fn run_budget_is_deterministic_for_a_fixed_seed() {
        let inst = build_instance();
        let sol_a = fully_assigned(&inst);
        let sol_b = fully_assigned(&inst);

        let mut engine_a = AlnsEngine::new(&inst, &sol_a).unwrap();
        let mut rng_a = StdRng::seed_from_u64(77);
        let report_a = engine_a.run_budget(&inst, sol_a, 100, false, &mut rng_a).unwrap();

        let mut engine_b = AlnsEngine::new(&inst, &sol_b).unwrap();
        let mut rng_b = StdRng::seed_from_u64(77);
        let report_b = engine_b.run_budget(&inst, sol_b, 100, false, &mut rng_b).unwrap();

        assert_eq!(report_a.best.fingerprint_uncached(), report_b.best.fingerprint_uncached());
    }

    #[test]
    fn stop_when_all_assigned_returns_early() {
        let inst = build_instance();
        let sol = fully_assigned(&inst);
        let mut engine = AlnsEngine::new(&inst, &sol).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let report = engine.run_budget(&inst, sol, 10_000, true, &mut rng).unwrap();
        assert!(report.best.request_bank().is_empty());
        assert!(report.iterations_run <= 10_000);
    }
}
