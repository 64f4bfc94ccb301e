//! Solution: the collection of routes, banks, and indices (§4.2).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::PdptwError;
use crate::model::ProblemInstance;
use crate::route::Route;

/// A complete (possibly partial) solution: one `Route` per vehicle in use,
/// a request bank of unassigned requests, and a vehicle bank of idle
/// vehicles, plus the indices and cached costs §4.2 specifies.
#[derive(Debug, Clone)]
pub struct Solution {
    routes: BTreeMap<usize, Route>,
    request_bank: BTreeSet<usize>,
    vehicle_bank: BTreeSet<usize>,
    request_to_vehicle: BTreeMap<usize, usize>,
    distance_cost: f64,
    time_cost: f64,
    fingerprint_cache: Option<u64>,
}

impl Solution {
    /// An empty solution: every request unassigned, every vehicle idle.
    pub fn empty(instance: &ProblemInstance) -> Self {
        Self {
            routes: BTreeMap::new(),
            request_bank: (0..instance.num_requests()).collect(),
            vehicle_bank: instance.vehicle_ids().collect(),
            request_to_vehicle: BTreeMap::new(),
            distance_cost: 0.0,
            time_cost: 0.0,
            fingerprint_cache: None,
        }
    }

    pub fn routes(&self) -> &BTreeMap<usize, Route> {
        &self.routes
    }

    pub fn request_bank(&self) -> &BTreeSet<usize> {
        &self.request_bank
    }

    pub fn vehicle_bank(&self) -> &BTreeSet<usize> {
        &self.vehicle_bank
    }

    pub fn request_vehicle(&self, request_id: usize) -> Option<usize> {
        self.request_to_vehicle.get(&request_id).copied()
    }

    pub fn total_distance(&self) -> f64 {
        self.distance_cost
    }

    pub fn total_duration(&self) -> f64 {
        self.time_cost
    }

    fn invalidate_cache(&mut self) {
        self.fingerprint_cache = None;
    }

    /// Recomputes the route for `vehicle_id`, or removes it from `routes`
    /// and returns the vehicle to the bank if it is now empty.
    fn settle_route(&mut self, vehicle_id: usize, route: Route) {
        if route.is_empty() {
            self.routes.remove(&vehicle_id);
            self.vehicle_bank.insert(vehicle_id);
        } else {
            self.routes.insert(vehicle_id, route);
        }
    }

    /// Requires `r` in the request bank and `v` in `r`'s compatible set.
    /// On success, updates indices, banks, and cached costs.
    pub fn insert_optimal_into_vehicle(
        &mut self,
        instance: &ProblemInstance,
        request_id: usize,
        vehicle_id: usize,
    ) -> Result<bool, PdptwError> {
        if !self.request_bank.contains(&request_id) {
            return Err(PdptwError::state_violation(format!(
                "insert_optimal_into_vehicle: request {request_id} is not in the bank"
            )));
        }
        let request = instance.request(request_id);
        if !request.is_compatible(vehicle_id) {
            return Err(PdptwError::state_violation(format!(
                "insert_optimal_into_vehicle: vehicle {vehicle_id} is not compatible with request {request_id}"
            )));
        }

        let route = match self.routes.get(&vehicle_id) {
            Some(r) => r.clone(),
            None => {
                if !self.vehicle_bank.contains(&vehicle_id) {
                    return Err(PdptwError::state_violation(format!(
                        "insert_optimal_into_vehicle: vehicle {vehicle_id} is neither routed nor banked"
                    )));
                }
                Route::new(instance, vehicle_id)
            }
        };

        match route.try_insert_optimal(instance, request) {
            crate::error::Feasibility::Infeasible => Ok(false),
            crate::error::Feasibility::Feasible((new_route, dd, td)) => {
                self.vehicle_bank.remove(&vehicle_id);
                self.settle_route(vehicle_id, new_route);
                self.request_bank.remove(&request_id);
                self.request_to_vehicle.insert(request_id, vehicle_id);
                self.distance_cost += dd;
                self.time_cost += td;
                self.invalidate_cache();
                Ok(true)
            }
        }
    }

    /// Iterates `compatible_vehicles(r) ∩ (routes ∪ vehicleBank)` in
    /// ascending vehicle-id order (deterministic); first success wins.
    pub fn insert_optimal_into_any(
        &mut self,
        instance: &ProblemInstance,
        request_id: usize,
    ) -> Result<bool, PdptwError> {
        let request = instance.request(request_id);
        let candidates: Vec<usize> = request
            .compatible_vehicles()
            .iter()
            .copied()
            .filter(|v| self.routes.contains_key(v) || self.vehicle_bank.contains(v))
            .collect();

        for vehicle_id in candidates {
            if self.insert_optimal_into_vehicle(instance, request_id, vehicle_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Trial-copy cost of inserting `r` into `v`; does not mutate `self`.
    pub fn cost_if_insert(
        &self,
        instance: &ProblemInstance,
        request_id: usize,
        vehicle_id: usize,
    ) -> (bool, f64) {
        let request = instance.request(request_id);
        if !request.is_compatible(vehicle_id) {
            return (false, f64::INFINITY);
        }
        let route = match self.routes.get(&vehicle_id) {
            Some(r) => r.clone(),
            None => Route::new(instance, vehicle_id),
        };
        match route.try_insert_optimal(instance, request) {
            crate::error::Feasibility::Infeasible => (false, f64::INFINITY),
            crate::error::Feasibility::Feasible((_, dd, td)) => {
                let p = instance.parameters();
                (true, p.alpha * dd + p.beta * td)
            }
        }
    }

    /// Trial-copy savings magnitude of removing `r`; does not mutate `self`.
    pub fn cost_if_remove(&self, instance: &ProblemInstance, request_id: usize) -> f64 {
        let vehicle_id = match self.request_to_vehicle.get(&request_id) {
            Some(v) => *v,
            None => return 0.0,
        };
        let mut route = self.routes[&vehicle_id].clone();
        let request = instance.request(request_id);
        let (dd, td) = route
            .remove_pair(instance, request)
            .expect("cost_if_remove: request indexed as assigned but not found on its route");
        let p = instance.parameters();
        (p.alpha * dd + p.beta * td).abs()
    }

    /// Bulk paired removal: requests return to the bank; a route whose last
    /// request is removed returns its vehicle to the bank.
    pub fn remove_requests(
        &mut self,
        instance: &ProblemInstance,
        request_ids: &[usize],
    ) -> Result<(), PdptwError> {
        for &request_id in request_ids {
            let vehicle_id = self.request_to_vehicle.remove(&request_id).ok_or_else(|| {
                PdptwError::state_violation(format!(
                    "remove_requests: request {request_id} is not currently assigned"
                ))
            })?;
            let mut route = self.routes.remove(&vehicle_id).ok_or_else(|| {
                PdptwError::state_violation(format!(
                    "remove_requests: vehicle {vehicle_id} has no active route"
                ))
            })?;
            let request = instance.request(request_id);
            let (dd, td) = route.remove_pair(instance, request)?;
            self.distance_cost += dd;
            self.time_cost += td;
            self.settle_route(vehicle_id, route);
            self.request_bank.insert(request_id);
        }
        self.invalidate_cache();
        Ok(())
    }

    /// Thin wrapper over `ProblemInstance::add_clone_of_vehicle`: the new
    /// vehicle starts idle in the bank.
    pub fn add_clone_vehicle(
        &mut self,
        instance: &mut ProblemInstance,
        reference_vehicle_id: usize,
    ) -> Result<usize, PdptwError> {
        let new_id = instance.add_clone_of_vehicle(reference_vehicle_id)?;
        self.vehicle_bank.insert(new_id);
        self.invalidate_cache();
        Ok(new_id)
    }

    /// Unassigns every request on `vehicle_id` (returning them to the bank),
    /// then deletes the vehicle from the instance and this solution's banks.
    pub fn delete_vehicle_and_route(
        &mut self,
        instance: &mut ProblemInstance,
        vehicle_id: usize,
    ) -> Result<(), PdptwError> {
        if let Some(route) = self.routes.get(&vehicle_id) {
            let assigned: Vec<usize> = self
                .request_to_vehicle
                .iter()
                .filter(|(_, &v)| v == vehicle_id)
                .map(|(&r, _)| r)
                .collect();
            debug_assert!(!route.is_empty() || assigned.is_empty());
            self.remove_requests(instance, &assigned)?;
        }
        self.routes.remove(&vehicle_id);
        self.vehicle_bank.remove(&vehicle_id);
        instance.delete_vehicle(vehicle_id)?;
        self.invalidate_cache();
        Ok(())
    }

    /// `alpha * total_distance + beta * total_duration + gama * |bank|`.
    pub fn objective(&self, instance: &ProblemInstance) -> f64 {
        let p = instance.parameters();
        p.alpha * self.distance_cost + p.beta * self.time_cost + p.gama * self.request_bank.len() as f64
    }

    /// `alpha * total_distance + beta * total_duration`, used to seed the
    /// ALNS initial SA temperature.
    pub fn objective_sans_bank(&self, instance: &ProblemInstance) -> f64 {
        let p = instance.parameters();
        p.alpha * self.distance_cost + p.beta * self.time_cost
    }

    /// Stable 64-bit hash over `(vehicleId, route-as-id-sequence)` sorted by
    /// vehicle id. Cached and invalidated on every mutation.
    pub fn fingerprint(&mut self) -> u64 {
        if let Some(fp) = self.fingerprint_cache {
            return fp;
        }
        let fp = fnv1a(&self.routes);
        self.fingerprint_cache = Some(fp);
        fp
    }

    /// Same as [`Solution::fingerprint`] but does not write back to the
    /// cache (useful for trial solutions about to be discarded).
    pub fn fingerprint_uncached(&self) -> u64 {
        self.fingerprint_cache.unwrap_or_else(|| fnv1a(&self.routes))
    }

    /// One-line human-readable summary (§6.3: "Text summary line format is
    /// implementation-defined").
    pub fn summary_line(&self, instance: &ProblemInstance) -> String {
        format!(
            "objective={:.3} distance={:.3} duration={:.3} vehicles_used={} unassigned={}",
            self.objective(instance),
            self.distance_cost,
            self.time_cost,
            self.routes.len(),
            self.request_bank.len(),
        )
    }
}

fn fnv1a(routes: &BTreeMap<usize, Route>) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    let mut feed = |bytes: &[u8]| {
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(PRIME);
        }
    };
    // BTreeMap iterates in ascending vehicle-id order already.
    for (vehicle_id, route) in routes {
        feed(&vehicle_id.to_le_bytes());
        for &node_id in route.node_sequence() {
            feed(&node_id.to_le_bytes());
        }
    }
    hash
}
