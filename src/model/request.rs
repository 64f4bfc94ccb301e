//! Request type: a paired pickup/delivery with a compatible-vehicle set.

use std::collections::BTreeSet;

/// A pickup-and-delivery request.
///
/// Invariant (checked by the `ProblemInstance` builder, not here):
/// `load(pick_node) == +required_capacity` and
/// `load(delivery_node) == -required_capacity`.
///
/// # Examples
///
/// ```
/// use pdptw_alns::model::Request;
/// use std::collections::BTreeSet;
///
/// let compat: BTreeSet<usize> = [0, 1].into_iter().collect();
/// let r = Request::new(0, 1, 2, 10, compat);
/// assert!(r.is_compatible(0));
/// assert!(!r.is_compatible(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    id: usize,
    pick_node_id: usize,
    delivery_node_id: usize,
    required_capacity: i32,
    compatible_vehicles: BTreeSet<usize>,
}

impl Request {
    pub fn new(
        id: usize,
        pick_node_id: usize,
        delivery_node_id: usize,
        required_capacity: i32,
        compatible_vehicles: BTreeSet<usize>,
    ) -> Self {
        Self {
            id,
            pick_node_id,
            delivery_node_id,
            required_capacity,
            compatible_vehicles,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pick_node_id(&self) -> usize {
        self.pick_node_id
    }

    pub fn delivery_node_id(&self) -> usize {
        self.delivery_node_id
    }

    pub fn required_capacity(&self) -> i32 {
        self.required_capacity
    }

    pub fn compatible_vehicles(&self) -> &BTreeSet<usize> {
        &self.compatible_vehicles
    }

    pub fn is_compatible(&self, vehicle_id: usize) -> bool {
        self.compatible_vehicles.contains(&vehicle_id)
    }

    /// Registers a newly added vehicle as compatible with this request.
    /// Used when `ProblemInstance::add_clone_of_vehicle` grows the fleet in
    /// homogeneous-fleet mode (§6.1: "all vehicles are initially compatible
    /// with all requests").
    pub fn add_compatible_vehicle(&mut self, vehicle_id: usize) {
        self.compatible_vehicles.insert(vehicle_id);
    }

    /// Removes a vehicle from the compatible set, e.g. after
    /// `ProblemInstance::delete_vehicle`.
    pub fn remove_compatible_vehicle(&mut self, vehicle_id: usize) {
        self.compatible_vehicles.remove(&vehicle_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_lookup() {
        let compat: BTreeSet<usize> = [0, 2].into_iter().collect();
        let r = Request::new(0, 1, 2, 5, compat);
        assert!(r.is_compatible(0));
        assert!(r.is_compatible(2));
        assert!(!r.is_compatible(1));
    }

    #[test]
    fn add_and_remove_compatible_vehicle() {
        let mut r = Request::new(0, 1, 2, 5, BTreeSet::new());
        assert!(!r.is_compatible(3));
        r.add_compatible_vehicle(3);
        assert!(r.is_compatible(3));
        r.remove_compatible_vehicle(3);
        assert!(!r.is_compatible(3));
    }
}
