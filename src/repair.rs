//! Repair operators: greedy insertion and regret-k insertion (§4.4).

use rand::Rng;

use crate::model::ProblemInstance;
use crate::solution::Solution;

/// Cost sentinel for an infeasible or incompatible `(request, vehicle)` pair.
/// Chosen well above any realistic route cost so it always loses an
/// `argmin`/comparison against a feasible cost, while staying finite so
/// arithmetic on it (e.g. regret sums) cannot overflow or produce `NaN`.
pub const UNLIMITED: f64 = 1e14;

/// One `requestId x vehicleId` cost table entry, rebuilt lazily per §4.4.
#[derive(Debug, Clone, Copy)]
struct Entry {
    vehicle_id: usize,
    cost: f64,
}

/// The cost table `C: requestId x vehicleId -> cost`, restricted to
/// requests still in the bank and vehicles in `routes ∪ vehicleBank`.
struct CostTable {
    /// Per-request rows, each sorted ascending by cost.
    rows: std::collections::BTreeMap<usize, Vec<Entry>>,
}

impl CostTable {
    fn build(instance: &ProblemInstance, solution: &Solution) -> Self {
        let candidate_vehicles: Vec<usize> = solution
            .routes()
            .keys()
            .copied()
            .chain(solution.vehicle_bank().iter().copied())
            .collect();

        let mut rows = std::collections::BTreeMap::new();
        for &r in solution.request_bank() {
            rows.insert(r, Self::row_for(instance, solution, r, &candidate_vehicles));
        }
        Self { rows }
    }

    fn row_for(
        instance: &ProblemInstance,
        solution: &Solution,
        request_id: usize,
        candidate_vehicles: &[usize],
    ) -> Vec<Entry> {
        // One entry per candidate vehicle regardless of compatibility —
        // incompatible or infeasible vehicles get the UNLIMITED sentinel
        // rather than being dropped from the row (§4.4).
        let mut row: Vec<Entry> = candidate_vehicles
            .iter()
            .map(|&vehicle_id| {
                let (feasible, cost) = solution.cost_if_insert(instance, request_id, vehicle_id);
                Entry {
                    vehicle_id,
                    cost: if feasible { cost } else { UNLIMITED },
                }
            })
            .collect();
        row.sort_by(|a, b| a.cost.partial_cmp(&b.cost).expect("costs are never NaN"));
        row
    }

    /// Recomputes only the rows for requests still in the bank after vehicle
    /// `vehicle_id` was just modified (§4.4: "recompute only the column for
    /// v*"). Since rows are stored per-request rather than per-column, this
    /// walks every remaining row and refreshes that vehicle's entry.
    fn recompute_vehicle(&mut self, instance: &ProblemInstance, solution: &Solution, vehicle_id: usize) {
        for (&request_id, row) in self.rows.iter_mut() {
            let Some(entry) = row.iter_mut().find(|e| e.vehicle_id == vehicle_id) else {
                continue;
            };
            let (feasible, cost) = solution.cost_if_insert(instance, request_id, vehicle_id);
            entry.cost = if feasible { cost } else { UNLIMITED };
            row.sort_by(|a, b| a.cost.partial_cmp(&b.cost).expect("costs are never NaN"));
        }
    }

    fn remove_request(&mut self, request_id: usize) {
        self.rows.remove(&request_id);
    }

    fn best(&self, request_id: usize) -> Option<Entry> {
        self.rows.get(&request_id).and_then(|row| row.first().copied())
    }
}

fn apply_noise(cost: f64, dmax: f64, eta: f64, rng: &mut impl Rng) -> f64 {
    if cost >= UNLIMITED {
        return cost;
    }
    let noise = rng.random_range(-eta * dmax..eta * dmax);
    (cost + noise).max(0.0)
}

/// Iterates up to `q` times (or until the bank/feasible set is exhausted):
/// finds `(r*, v*) = argmin C`, stops once the minimum reaches `UNLIMITED`,
/// commits the insertion, and recomputes the column for `v*`.
pub fn greedy_insertion(
    instance: &ProblemInstance,
    solution: &mut Solution,
    q: usize,
    noise: bool,
    rng: &mut impl Rng,
) {
    let mut table = CostTable::build(instance, solution);
    let dmax = instance.max_distance();
    let eta = instance.parameters().eta;

    for _ in 0..q {
        if solution.request_bank().is_empty() {
            break;
        }
        let mut best: Option<(usize, Entry)> = None;
        for &r in solution.request_bank() {
            if let Some(mut e) = table.best(r) {
                if noise {
                    e.cost = apply_noise(e.cost, dmax, eta, rng);
                }
                if best.is_none_or(|(_, b)| e.cost < b.cost) {
                    best = Some((r, e));
                }
            }
        }
        let Some((request_id, entry)) = best else {
            break;
        };
        if entry.cost >= UNLIMITED {
            break;
        }

        solution
            .insert_optimal_into_vehicle(instance, request_id, entry.vehicle_id)
            .expect("greedy_insertion: cost table entry implies feasibility");
        table.remove_request(request_id);
        table.recompute_vehicle(instance, solution, entry.vehicle_id);
    }
}

/// Regret-`k` insertion. For each remaining request, `regret(r) = sum of
/// the first `k` sorted costs minus k times the best cost`; the request
/// with maximum regret and a feasible best cost is committed, then the
/// column for the vehicle used is refreshed. `k` must be `<= num_vehicles`
/// (the caller, the ALNS engine, guarantees this).
pub fn regret_insertion(
    instance: &ProblemInstance,
    solution: &mut Solution,
    q: usize,
    k: usize,
    noise: bool,
    rng: &mut impl Rng,
) {
    assert!(
        k >= 1 && k <= instance.num_vehicles().max(1),
        "regret_insertion: k={k} must be in [1, num_vehicles={}]",
        instance.num_vehicles()
    );

    let mut table = CostTable::build(instance, solution);
    let dmax = instance.max_distance();
    let eta = instance.parameters().eta;
    let cap = 2 * q.min(solution.request_bank().len()).max(1);

    for _ in 0..cap {
        if solution.request_bank().is_empty() {
            break;
        }

        let mut best: Option<(usize, f64, Entry)> = None;
        for &r in solution.request_bank() {
            let Some(row) = table.rows.get(&r) else { continue };
            let feasible_count = row.iter().filter(|e| e.cost < UNLIMITED).count();
            if feasible_count < k {
                continue;
            }
            let mut sorted = row.clone();
            if noise {
                for e in sorted.iter_mut() {
                    e.cost = apply_noise(e.cost, dmax, eta, rng);
                }
                sorted.sort_by(|a, b| a.cost.partial_cmp(&b.cost).expect("costs are never NaN"));
            }
            let top = sorted[0];
            if top.cost >= UNLIMITED {
                continue;
            }
            let regret: f64 = sorted[..k].iter().map(|e| e.cost - top.cost).sum();
            if best.is_none_or(|(_, best_regret, _)| regret > best_regret) {
                best = Some((r, regret, top));
            }
        }

        let Some((request_id, _, entry)) = best else {
            break;
        };

        solution
            .insert_optimal_into_vehicle(instance, request_id, entry.vehicle_id)
            .expect("regret_insertion: cost table entry implies feasibility");
        table.remove_request(request_id);
        table.recompute_vehicle(instance, solution, entry.vehicle_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destroy::random_removal;
    use crate::model::{Node, Parameters, Request, Vehicle};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

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
            depot().with_id(5),
            depot().with_id(6),
        ];
        let vehicles = vec![Vehicle::new(0, 50, 1.0, 5, 6)];
        let compat: BTreeSet<usize> = [0].into_iter().collect();
        let requests = vec![
            Request::new(0, 1, 2, 10, compat.clone()),
            Request::new(1, 3, 4, 15, compat),
        ];
        ProblemInstance::new(nodes, depot(), requests, vehicles, Parameters::default())
            .expect("valid instance")
    }

    #[test]
    fn greedy_insertion_empties_the_bank_when_feasible() {
        let inst = build_instance();
        let mut sol = Solution::empty(&inst);
        let mut rng = StdRng::seed_from_u64(7);
        greedy_insertion(&inst, &mut sol, 2, false, &mut rng);
        assert!(sol.request_bank().is_empty());
    }

    #[test]
    fn regret_insertion_empties_the_bank_when_feasible() {
        let inst = build_instance();
        let mut sol = Solution::empty(&inst);
        let mut rng = StdRng::seed_from_u64(8);
        regret_insertion(&inst, &mut sol, 2, 1, false, &mut rng);
        assert!(sol.request_bank().is_empty());
    }

    #[test]
    fn destroy_then_repair_round_trips_to_full_assignment() {
        let inst = build_instance();
        let mut sol = Solution::empty(&inst);
        let mut rng = StdRng::seed_from_u64(9);
        greedy_insertion(&inst, &mut sol, 2, false, &mut rng);
        random_removal(&inst, &mut sol, 1, &mut rng);
        assert_eq!(sol.request_bank().len(), 1);
        greedy_insertion(&inst, &mut sol, 1, false, &mut rng);
        assert!(sol.request_bank().is_empty());
    }

    #[test]
    fn noise_wrapper_keeps_costs_non_negative() {
        let dmax = 100.0;
        let eta = 0.5;
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let noisy = apply_noise(0.0, dmax, eta, &mut rng);
            assert!(noisy >= 0.0);
        }
    }
}
