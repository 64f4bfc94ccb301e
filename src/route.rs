//! Route: one vehicle's ordered visit sequence with prefix arrays (§4.1).

use crate::error::{Feasibility, PdptwError};
use crate::model::{ProblemInstance, Request};

/// One vehicle's route: `[startDepot, ...interior..., endDepot]`, plus three
/// parallel prefix arrays of the same length as the node sequence —
/// `start_service[k]`, `load[k]`, `dist[k]` — maintained per the recurrences
/// in §3/§4.1.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    vehicle_id: usize,
    nodes: Vec<usize>,
    start_service: Vec<f64>,
    load: Vec<i32>,
    dist: Vec<f64>,
}

/// Non-negligible tardiness tolerance used when comparing a computed service
/// start against a node's due time (§9: use an epsilon rather than a bare
/// strict inequality to avoid float-noise false infeasibility).
const TIME_EPS: f64 = 1e-6;

impl Route {
    /// Creates a fresh, empty route for `vehicle_id` bracketed by its depot
    /// pair. Always feasible (§4.1 `isEmpty`).
    pub fn new(instance: &ProblemInstance, vehicle_id: usize) -> Self {
        let vehicle = instance
            .vehicle(vehicle_id)
            .expect("Route::new called with unknown vehicle id");
        let nodes = vec![vehicle.start_depot_id(), vehicle.end_depot_id()];
        let (start_service, load, dist) = evaluate_nodes(instance, vehicle_id, &nodes)
            .into_option()
            .expect("an empty two-depot route is always feasible");
        Self {
            vehicle_id,
            nodes,
            start_service,
            load,
            dist,
        }
    }

    pub fn vehicle_id(&self) -> usize {
        self.vehicle_id
    }

    /// The node id sequence, depot-to-depot.
    pub fn node_sequence(&self) -> &[usize] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True iff this route holds only its two depots (§4.1 `isEmpty`).
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 2
    }

    pub fn total_distance(&self) -> f64 {
        *self.dist.last().expect("route always has >= 2 nodes")
    }

    /// Total elapsed route duration: final service start minus initial
    /// service start.
    pub fn total_duration(&self) -> f64 {
        self.start_service.last().expect("route always has >= 2 nodes")
            - self.start_service.first().expect("route always has >= 2 nodes")
    }

    /// O(|route|) lookup of the service start time at a given node id.
    pub fn start_service_of(&self, node_id: usize) -> Option<f64> {
        self.nodes
            .iter()
            .position(|&n| n == node_id)
            .map(|idx| self.start_service[idx])
    }

    fn position_of(&self, node_id: usize) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node_id)
    }

    /// Inserts `request`'s pickup at (pre-insertion) index `i` and delivery
    /// at `j`, with `1 <= i < j <= self.len()`. On success, mutates `self`
    /// to the post-insertion route and returns `(distance_delta,
    /// time_delta)`. On infeasibility, `self` is left unchanged.
    pub fn try_insert_at(
        &mut self,
        instance: &ProblemInstance,
        request: &Request,
        i: usize,
        j: usize,
    ) -> Feasibility<(f64, f64)> {
        assert!(
            1 <= i && i < j && j <= self.len(),
            "try_insert_at: require 1 <= i < j <= len, got i={i} j={j} len={}",
            self.len()
        );

        let mut candidate = self.nodes.clone();
        candidate.insert(i, request.pick_node_id());
        candidate.insert(j, request.delivery_node_id());

        match evaluate_nodes(instance, self.vehicle_id, &candidate) {
            Feasibility::Infeasible => Feasibility::Infeasible,
            Feasibility::Feasible((start_service, load, dist)) => {
                let old_dist = self.total_distance();
                let old_dur = self.total_duration();
                let new_dist = *dist.last().expect("non-empty");
                let new_dur = start_service.last().expect("non-empty") - start_service[0];

                self.nodes = candidate;
                self.start_service = start_service;
                self.load = load;
                self.dist = dist;

                Feasibility::Feasible((new_dist - old_dist, new_dur - old_dur))
            }
        }
    }

    /// Scans every feasible `(i, j)` position for `request` and returns the
    /// new route (by value, `self` unmodified) minimizing
    /// `alpha * distance_delta + beta * time_delta`, ties broken by the
    /// first `(i, j)` found in lexicographic order.
    pub fn try_insert_optimal(
        &self,
        instance: &ProblemInstance,
        request: &Request,
    ) -> Feasibility<(Route, f64, f64)> {
        let params = instance.parameters();
        let mut best: Option<(f64, Route, f64, f64)> = None;
        let l = self.len();

        for i in 1..l {
            for j in (i + 1)..=l {
                let mut trial = self.clone();
                if let Feasibility::Feasible((dd, td)) =
                    trial.try_insert_at(instance, request, i, j)
                {
                    let score = params.alpha * dd + params.beta * td;
                    if best.as_ref().is_none_or(|(s, ..)| score < *s) {
                        best = Some((score, trial, dd, td));
                    }
                }
            }
        }

        match best {
            Some((_, route, dd, td)) => Feasibility::Feasible((route, dd, td)),
            None => Feasibility::Infeasible,
        }
    }

    /// Removes `request`'s pickup and delivery from this route and
    /// recomputes the prefix arrays. Fails loudly (`PdptwError::StateViolation`)
    /// if the request is not present on this route, or this vehicle is not
    /// in the request's compatible set.
    pub fn remove_pair(
        &mut self,
        instance: &ProblemInstance,
        request: &Request,
    ) -> Result<(f64, f64), PdptwError> {
        if !request.is_compatible(self.vehicle_id) {
            return Err(PdptwError::state_violation(format!(
                "remove_pair: vehicle {} is not compatible with request {}",
                self.vehicle_id,
                request.id()
            )));
        }
        let pick_pos = self.position_of(request.pick_node_id()).ok_or_else(|| {
            PdptwError::state_violation(format!(
                "remove_pair: pickup node for request {} not found on vehicle {}",
                request.id(),
                self.vehicle_id
            ))
        })?;
        let delivery_pos = self
            .position_of(request.delivery_node_id())
            .ok_or_else(|| {
                PdptwError::state_violation(format!(
                    "remove_pair: delivery node for request {} not found on vehicle {}",
                    request.id(),
                    self.vehicle_id
                ))
            })?;

        let mut candidate = self.nodes.clone();
        // Remove the later index first so the earlier index stays valid.
        let (first, second) = if pick_pos < delivery_pos {
            (delivery_pos, pick_pos)
        } else {
            (pick_pos, delivery_pos)
        };
        candidate.remove(first);
        candidate.remove(second);

        let (start_service, load, dist) = evaluate_nodes(instance, self.vehicle_id, &candidate)
            .into_option()
            .ok_or_else(|| {
                PdptwError::state_violation(
                    "remove_pair: removing a pair made the route infeasible, which should be \
                     impossible since removal can only relax constraints",
                )
            })?;

        let old_dist = self.total_distance();
        let old_dur = self.total_duration();
        let new_dist = *dist.last().expect("non-empty");
        let new_dur = start_service.last().expect("non-empty") - start_service[0];

        self.nodes = candidate;
        self.start_service = start_service;
        self.load = load;
        self.dist = dist;

        Ok((new_dist - old_dist, new_dur - old_dur))
    }
}

/// Computes the three prefix arrays for a candidate node sequence, or
/// `Infeasible` if any time-window or capacity invariant fails at any
/// index (§4.1 feasibility semantics).
fn evaluate_nodes(
    instance: &ProblemInstance,
    vehicle_id: usize,
    nodes: &[usize],
) -> Feasibility<(Vec<f64>, Vec<i32>, Vec<f64>)> {
    let vehicle = instance
        .vehicle(vehicle_id)
        .expect("evaluate_nodes called with unknown vehicle id");
    let n = nodes.len();
    let mut start_service = vec![0.0; n];
    let mut load = vec![0; n];
    let mut dist = vec![0.0; n];

    let first = instance.node(nodes[0]);
    start_service[0] = first.earliest_service();
    if start_service[0] > first.latest_service() + TIME_EPS {
        return Feasibility::Infeasible;
    }
    load[0] = first.load();
    if load[0] < 0 || load[0] > vehicle.capacity() {
        return Feasibility::Infeasible;
    }

    for k in 1..n {
        let prev_id = nodes[k - 1];
        let cur_id = nodes[k];
        let prev = instance.node(prev_id);
        let cur = instance.node(cur_id);

        let arrival = start_service[k - 1]
            + prev.service_duration()
            + instance.travel_time(vehicle_id, prev_id, cur_id);
        let service_start = arrival.max(cur.earliest_service());
        if service_start > cur.latest_service() + TIME_EPS {
            return Feasibility::Infeasible;
        }
        start_service[k] = service_start;

        load[k] = load[k - 1] + cur.load();
        if load[k] < 0 || load[k] > vehicle.capacity() {
            return Feasibility::Infeasible;
        }

        dist[k] = dist[k - 1] + instance.distance(prev_id, cur_id);
    }

    Feasibility::Feasible((start_service, load, dist))
}
