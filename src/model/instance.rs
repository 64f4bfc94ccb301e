//! The immutable (save for fleet-extension) problem instance (§3).

use std::collections::{BTreeMap, BTreeSet};

use crate::error::PdptwError;
use crate::model::distance::{travel_time, DistanceMatrix};
use crate::model::node::Node;
use crate::model::parameters::Parameters;
use crate::model::request::Request;
use crate::model::vehicle::Vehicle;

/// The spatial/temporal/vehicle data for one PDPTW run, plus the mutable
/// "fleet extension" facility used by the two-stage driver.
///
/// Node and vehicle ids are small contiguous integers assigned on ingest
/// (§9). Vehicle ids may develop gaps after `delete_vehicle`; node ids are
/// append-only (deleted vehicles leave their depot pair unreferenced but do
/// not shrink the node table).
#[derive(Debug, Clone)]
pub struct ProblemInstance {
    nodes: Vec<Node>,
    depot_template: Node,
    requests: Vec<Request>,
    vehicles: BTreeMap<usize, Vehicle>,
    distances: DistanceMatrix,
    params: Parameters,
    next_vehicle_id: usize,
}

impl ProblemInstance {
    /// Builds a validated problem instance.
    ///
    /// `depot_template` is the original depot (before any per-vehicle clone)
    /// used as the coordinate/window source when `add_clone_of_vehicle`
    /// mints a new depot pair. `nodes` must already include one depot pair
    /// per vehicle in `vehicles` (ids `start_depot_id`/`end_depot_id`).
    pub fn new(
        nodes: Vec<Node>,
        depot_template: Node,
        requests: Vec<Request>,
        vehicles: Vec<Vehicle>,
        params: Parameters,
    ) -> Result<Self, PdptwError> {
        params.validate()?;

        for v in &vehicles {
            if v.capacity() <= 0 {
                return Err(PdptwError::data(format!(
                    "vehicle {} has non-positive capacity {}",
                    v.id(),
                    v.capacity()
                )));
            }
            if v.velocity() <= 0.0 || !v.velocity().is_finite() {
                return Err(PdptwError::data(format!(
                    "vehicle {} has non-positive velocity {}",
                    v.id(),
                    v.velocity()
                )));
            }
            if v.start_depot_id() >= nodes.len() || v.end_depot_id() >= nodes.len() {
                return Err(PdptwError::data(format!(
                    "vehicle {} references a depot id outside the node table",
                    v.id()
                )));
            }
        }

        let vehicle_ids: BTreeSet<usize> = vehicles.iter().map(|v| v.id()).collect();
        if vehicle_ids.len() != vehicles.len() {
            return Err(PdptwError::data("duplicate vehicle ids"));
        }

        for r in &requests {
            let pick = nodes.get(r.pick_node_id()).ok_or_else(|| {
                PdptwError::data(format!("request {} has unknown pick node", r.id()))
            })?;
            let delivery = nodes.get(r.delivery_node_id()).ok_or_else(|| {
                PdptwError::data(format!("request {} has unknown delivery node", r.id()))
            })?;
            if pick.load() != r.required_capacity() {
                return Err(PdptwError::data(format!(
                    "request {}: pick node load {} != required_capacity {}",
                    r.id(),
                    pick.load(),
                    r.required_capacity()
                )));
            }
            if delivery.load() != -r.required_capacity() {
                return Err(PdptwError::data(format!(
                    "request {}: delivery node load {} != -required_capacity {}",
                    r.id(),
                    delivery.load(),
                    r.required_capacity()
                )));
            }
            if r.required_capacity() <= 0 {
                return Err(PdptwError::data(format!(
                    "request {} has non-positive required_capacity",
                    r.id()
                )));
            }
            if !r.compatible_vehicles().is_subset(&vehicle_ids) {
                return Err(PdptwError::data(format!(
                    "request {} names a compatible vehicle outside the fleet",
                    r.id()
                )));
            }
        }

        let distances = DistanceMatrix::from_nodes(&nodes);
        let next_vehicle_id = vehicle_ids.iter().next_back().map_or(0, |id| id + 1);
        let vehicles = vehicles.into_iter().map(|v| (v.id(), v)).collect();

        Ok(Self {
            nodes,
            depot_template,
            requests,
            vehicles,
            distances,
            params,
            next_vehicle_id,
        })
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn request(&self, id: usize) -> &Request {
        &self.requests[id]
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn num_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn vehicle(&self, id: usize) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.vehicles.keys().copied()
    }

    pub fn num_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn distance(&self, from: usize, to: usize) -> f64 {
        self.distances.get(from, to)
    }

    pub fn travel_time(&self, vehicle_id: usize, from: usize, to: usize) -> f64 {
        let v = self
            .vehicles
            .get(&vehicle_id)
            .expect("travel_time called with unknown vehicle id");
        travel_time(&self.distances, v.velocity(), from, to)
    }

    pub fn max_distance(&self) -> f64 {
        self.distances.max_distance()
    }

    /// Clones `reference_vehicle_id`'s kind (capacity, velocity) into a new
    /// vehicle with a freshly minted depot pair, registers it as compatible
    /// with every request (homogeneous-fleet growth, §4.6 Phase A), and
    /// returns the new vehicle id.
    pub fn add_clone_of_vehicle(&mut self, reference_vehicle_id: usize) -> Result<usize, PdptwError> {
        let reference = *self.vehicles.get(&reference_vehicle_id).ok_or_else(|| {
            PdptwError::state_violation(format!(
                "add_clone_of_vehicle: unknown reference vehicle {reference_vehicle_id}"
            ))
        })?;

        let new_id = self.next_vehicle_id;
        self.next_vehicle_id += 1;

        let start_id = self.nodes.len();
        let start_node = self.depot_template.with_id(start_id);
        self.nodes.push(start_node);
        self.distances.push_node(&self.nodes);

        let end_id = self.nodes.len();
        let end_node = self.depot_template.with_id(end_id);
        self.nodes.push(end_node);
        self.distances.push_node(&self.nodes);

        let new_vehicle = reference.cloned_as(new_id, start_id, end_id);
        self.vehicles.insert(new_id, new_vehicle);

        for r in &mut self.requests {
            r.add_compatible_vehicle(new_id);
        }

        tracing::debug!(vehicle_id = new_id, "added clone of vehicle to fleet");
        Ok(new_id)
    }

    /// Removes a vehicle from the fleet and from every request's compatible
    /// set. Callers (the `Solution`/driver layer) are responsible for first
    /// unassigning any requests currently riding on this vehicle — this
    /// method only mutates the instance-level fleet, matching §4.2's
    /// "`deleteVehicleAndRoute` ... first unassigns all requests on v".
    pub fn delete_vehicle(&mut self, vehicle_id: usize) -> Result<(), PdptwError> {
        if self.vehicles.remove(&vehicle_id).is_none() {
            return Err(PdptwError::state_violation(format!(
                "delete_vehicle: unknown vehicle {vehicle_id}"
            )));
        }
        for r in &mut self.requests {
            r.remove_compatible_vehicle(vehicle_id);
        }
        tracing::debug!(vehicle_id, "deleted vehicle from fleet");
        Ok(())
    }

    /// The vehicle id with the maximum value currently in the fleet, used by
    /// Phase B of the two-stage driver to pick a shrink target (§4.6).
    pub fn max_vehicle_id(&self) -> Option<usize> {
        self.vehicles.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depot() -> Node {
        Node::new(0, 0.0, 0.0, 0.0, 1000.0, 0.0, 0)
    }

    fn two_vehicle_instance() -> ProblemInstance {
        let nodes = vec![
            depot(),
            Node::new(1, 10.0, 10.0, 0.0, 100.0, 5.0, 10),
            Node::new(2, 20.0, 20.0, 0.0, 200.0, 5.0, -10),
            // vehicle 0 depot pair
            depot().with_id(3),
            depot().with_id(4),
            // vehicle 1 depot pair
            depot().with_id(5),
            depot().with_id(6),
        ];
        let vehicles = vec![Vehicle::new(0, 50, 1.0, 3, 4), Vehicle::new(1, 50, 1.0, 5, 6)];
        let compat: BTreeSet<usize> = [0, 1].into_iter().collect();
        let requests = vec![Request::new(0, 1, 2, 10, compat)];
        ProblemInstance::new(nodes, depot(), requests, vehicles, Parameters::default())
            .expect("valid instance")
    }

    #[test]
    fn builds_valid_instance() {
        let inst = two_vehicle_instance();
        assert_eq!(inst.num_vehicles(), 2);
        assert_eq!(inst.num_requests(), 1);
    }

    #[test]
    fn rejects_mismatched_pickup_delivery_load() {
        let nodes = vec![
            depot(),
            Node::new(1, 10.0, 10.0, 0.0, 100.0, 5.0, 10),
            Node::new(2, 20.0, 20.0, 0.0, 200.0, 5.0, -5),
            depot().with_id(3),
            depot().with_id(4),
        ];
        let vehicles = vec![Vehicle::new(0, 50, 1.0, 3, 4)];
        let compat: BTreeSet<usize> = [0].into_iter().collect();
        let requests = vec![Request::new(0, 1, 2, 10, compat)];
        let result = ProblemInstance::new(nodes, depot(), requests, vehicles, Parameters::default());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_parameters() {
        let nodes = vec![depot(), depot().with_id(1), depot().with_id(2)];
        let vehicles = vec![Vehicle::new(0, 50, 1.0, 1, 2)];
        let mut params = Parameters::default();
        params.alpha = -1.0;
        let result = ProblemInstance::new(nodes, depot(), vec![], vehicles, params);
        assert!(result.is_err());
    }

    #[test]
    fn add_clone_of_vehicle_grows_fleet_and_compatibility() {
        let mut inst = two_vehicle_instance();
        let new_id = inst.add_clone_of_vehicle(0).expect("clone ok");
        assert_eq!(new_id, 2);
        assert_eq!(inst.num_vehicles(), 3);
        assert!(inst.request(0).is_compatible(new_id));
        assert_eq!(inst.max_vehicle_id(), Some(2));
    }

    #[test]
    fn delete_vehicle_removes_from_fleet_and_compatibility() {
        let mut inst = two_vehicle_instance();
        inst.delete_vehicle(1).expect("delete ok");
        assert_eq!(inst.num_vehicles(), 1);
        assert!(!inst.request(0).is_compatible(1));
        assert_eq!(inst.max_vehicle_id(), Some(0));
    }

    #[test]
    fn delete_unknown_vehicle_is_state_violation() {
        let mut inst = two_vehicle_instance();
        let err = inst.delete_vehicle(99).unwrap_err();
        assert!(err.is_state_violation());
    }

    #[test]
    fn distances_are_symmetric() {
        let inst = two_vehicle_instance();
        assert!((inst.distance(1, 2) - inst.distance(2, 1)).abs() < 1e-9);
    }
}
