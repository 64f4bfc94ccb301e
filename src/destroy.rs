//! Destroy operators: random, worst, and Shaw (relatedness) removal (§4.3).

use rand::Rng;

use crate::model::ProblemInstance;
use crate::solution::Solution;

/// Uniformly samples `q` distinct assigned requests without replacement and
/// removes them.
pub fn random_removal(
    instance: &ProblemInstance,
    solution: &mut Solution,
    q: usize,
    rng: &mut impl Rng,
) {
    let mut assigned: Vec<usize> = (0..instance.num_requests())
        .filter(|r| !solution.request_bank().contains(r))
        .collect();
    let n = q.min(assigned.len());
    let mut chosen = Vec::with_capacity(n);
    for _ in 0..n {
        let idx = rng.random_range(0..assigned.len());
        chosen.push(assigned.swap_remove(idx));
    }
    solution
        .remove_requests(instance, &chosen)
        .expect("random_removal: bank-indexed requests must be assigned");
}

/// Repeats `q` times: sorts currently assigned requests by `costIfRemove`
/// descending (largest savings first), draws `y` and picks index
/// `⌊y^p_worst · n⌋` (clamped), removes it, and repeats against the
/// remaining assigned set.
pub fn worst_removal(
    instance: &ProblemInstance,
    solution: &mut Solution,
    q: usize,
    rng: &mut impl Rng,
) {
    let p_worst = instance.parameters().p_worst as f64;
    for _ in 0..q {
        let mut assigned: Vec<usize> = (0..instance.num_requests())
            .filter(|r| !solution.request_bank().contains(r))
            .collect();
        if assigned.is_empty() {
            break;
        }
        assigned.sort_by(|&a, &b| {
            let ca = solution.cost_if_remove(instance, a);
            let cb = solution.cost_if_remove(instance, b);
            cb.partial_cmp(&ca).expect("costs are never NaN")
        });
        let n = assigned.len();
        let y: f64 = rng.random_range(0.0..1.0);
        let idx = ((y.powf(p_worst) * n as f64) as usize).min(n - 1);
        solution
            .remove_requests(instance, &[assigned[idx]])
            .expect("worst_removal: sorted from currently assigned requests");
    }
}

/// Relatedness `R(a, b)` per §4.3, with spatial/temporal/load components
/// min-max normalized to `[0, 1]` over the currently assigned set before
/// weighting; the vehicle-set term is used unnormalized (already in `[0,1]`).
fn relatedness_matrix(instance: &ProblemInstance, solution: &Solution, assigned: &[usize]) -> Vec<Vec<f64>> {
    let n = assigned.len();
    let params = instance.parameters();

    let mut spatial = vec![vec![0.0; n]; n];
    let mut temporal = vec![vec![0.0; n]; n];
    let mut load = vec![vec![0.0; n]; n];
    let mut vehicle_term = vec![vec![0.0; n]; n];

    for (ia, &a) in assigned.iter().enumerate() {
        let ra = instance.request(a);
        let va = ra.compatible_vehicles();
        let va_route = solution.request_vehicle(a).expect("assigned request has a route");
        let route_a = &solution.routes()[&va_route];
        let ta_p = route_a
            .start_service_of(ra.pick_node_id())
            .expect("pickup node present on its own route");
        let ta_d = route_a
            .start_service_of(ra.delivery_node_id())
            .expect("delivery node present on its own route");

        for (ib, &b) in assigned.iter().enumerate() {
            if ia == ib {
                continue;
            }
            let rb = instance.request(b);
            let vb = rb.compatible_vehicles();
            let vb_route = solution.request_vehicle(b).expect("assigned request has a route");
            let route_b = &solution.routes()[&vb_route];
            let tb_p = route_b
                .start_service_of(rb.pick_node_id())
                .expect("pickup node present on its own route");
            let tb_d = route_b
                .start_service_of(rb.delivery_node_id())
                .expect("delivery node present on its own route");

            spatial[ia][ib] = instance.distance(ra.pick_node_id(), rb.pick_node_id())
                + instance.distance(ra.delivery_node_id(), rb.delivery_node_id());
            temporal[ia][ib] = (ta_p - tb_p).abs() + (ta_d - tb_d).abs();
            load[ia][ib] = (ra.required_capacity() - rb.required_capacity()).unsigned_abs() as f64;

            let intersection = va.intersection(vb).count();
            let min_size = va.len().min(vb.len()).max(1);
            vehicle_term[ia][ib] = 1.0 - intersection as f64 / min_size as f64;
        }
    }

    normalize(&mut spatial);
    normalize(&mut temporal);
    normalize(&mut load);

    let mut r = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            r[i][j] = params.shaw_w1 * spatial[i][j]
                + params.shaw_w2 * temporal[i][j]
                + params.shaw_w3 * load[i][j]
                + params.shaw_w4 * vehicle_term[i][j];
        }
    }
    r
}

/// Min-max normalizes every entry of a square matrix to `[0, 1]`; a
/// degenerate (constant) range maps to all-zero.
fn normalize(m: &mut [Vec<f64>]) {
    let min = m
        .iter()
        .flat_map(|row| row.iter())
        .cloned()
        .fold(f64::INFINITY, f64::min);
    let max = m
        .iter()
        .flat_map(|row| row.iter())
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        for row in m.iter_mut() {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
        return;
    }
    for row in m.iter_mut() {
        for v in row.iter_mut() {
            *v = (*v - min) / range;
        }
    }
}

/// Seeds a destroy set `D` with one uniformly random assigned request, then
/// while `|D| < q`: picks a random member of `D`, sorts the remaining
/// assigned requests by relatedness ascending (most related first), draws
/// `y` and selects index `⌊y^p · n⌋` (clamped).
pub fn shaw_removal(
    instance: &ProblemInstance,
    solution: &mut Solution,
    q: usize,
    rng: &mut impl Rng,
) {
    let p = instance.parameters().p as f64;
    let mut assigned: Vec<usize> = (0..instance.num_requests())
        .filter(|r| !solution.request_bank().contains(r))
        .collect();
    if assigned.is_empty() {
        return;
    }

    let mut destroyed: Vec<usize> = Vec::with_capacity(q);
    let seed_idx = rng.random_range(0..assigned.len());
    destroyed.push(assigned.swap_remove(seed_idx));

    while destroyed.len() < q && !assigned.is_empty() {
        let anchor = destroyed[rng.random_range(0..destroyed.len())];

        // R(anchor, ·) against the remaining assigned requests; the anchor
        // has already left `assigned`, so fold it back in as the last row.
        let mut pool = assigned.clone();
        pool.push(anchor);
        let full = relatedness_matrix(instance, solution, &pool);
        let anchor_row = pool.len() - 1;

        let mut order: Vec<usize> = (0..assigned.len()).collect();
        order.sort_by(|&i, &j| {
            full[anchor_row][i]
                .partial_cmp(&full[anchor_row][j])
                .expect("relatedness is never NaN")
        });

        let n = order.len();
        let y: f64 = rng.random_range(0.0..1.0);
        let idx = ((y.powf(p) * n as f64) as usize).min(n - 1);
        let picked_pos = order[idx];
        destroyed.push(assigned.remove(picked_pos));
    }

    solution
        .remove_requests(instance, &destroyed)
        .expect("shaw_removal: drawn from currently assigned requests");
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn full_solution(instance: &ProblemInstance) -> Solution {
        let mut sol = Solution::empty(instance);
        sol.insert_optimal_into_vehicle(instance, 0, 0).unwrap();
        sol.insert_optimal_into_vehicle(instance, 1, 0).unwrap();
        sol
    }

    #[test]
    fn random_removal_moves_exactly_q_requests_to_bank() {
        let inst = build_instance();
        let mut sol = full_solution(&inst);
        let mut rng = StdRng::seed_from_u64(1);
        random_removal(&inst, &mut sol, 1, &mut rng);
        assert_eq!(sol.request_bank().len(), 1);
    }

    #[test]
    fn worst_removal_moves_exactly_q_requests_to_bank() {
        let inst = build_instance();
        let mut sol = full_solution(&inst);
        let mut rng = StdRng::seed_from_u64(2);
        worst_removal(&inst, &mut sol, 2, &mut rng);
        assert_eq!(sol.request_bank().len(), 2);
    }

    #[test]
    fn shaw_removal_moves_exactly_q_requests_to_bank() {
        let inst = build_instance();
        let mut sol = full_solution(&inst);
        let mut rng = StdRng::seed_from_u64(3);
        shaw_removal(&inst, &mut sol, 2, &mut rng);
        assert_eq!(sol.request_bank().len(), 2);
    }

    #[test]
    fn random_removal_is_deterministic_for_a_fixed_seed() {
        let inst = build_instance();
        let mut a = full_solution(&inst);
        let mut b = full_solution(&inst);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        random_removal(&inst, &mut a, 1, &mut rng_a);
        random_removal(&inst, &mut b, 1, &mut rng_b);
        assert_eq!(a.request_bank(), b.request_bank());
    }
}
