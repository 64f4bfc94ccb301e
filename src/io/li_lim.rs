//! A minimal Li & Lim PDPTW text format reader (§6.1).
//!
//! Line 1: `vehicleCount<TAB>capacity<TAB>speed`. Line 2: the depot, 9
//! fields `id x y demand tw_early tw_late service pickupIdx deliveryIdx`
//! (depot id must be `0`). Remaining lines: customer nodes, same 9 fields,
//! `id != 0`. A request is a customer node with positive demand and a
//! non-zero `deliveryIdx` pointing at its paired delivery node.

use std::collections::BTreeSet;

use crate::error::PdptwError;
use crate::model::{Node, Parameters, ProblemInstance, Request, Vehicle};

struct RawNode {
    id: usize,
    x: f64,
    y: f64,
    demand: i32,
    tw_early: f64,
    tw_late: f64,
    service: f64,
    pickup_idx: usize,
    delivery_idx: usize,
}

fn parse_fields(line: &str) -> Option<Vec<&str>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn parse_raw_node(fields: &[&str]) -> Result<RawNode, PdptwError> {
    if fields.len() != 9 {
        return Err(PdptwError::data(format!(
            "li_lim: expected 9 fields per node line, got {}: {:?}",
            fields.len(),
            fields
        )));
    }
    let field = |i: usize| -> Result<&str, PdptwError> {
        fields.get(i).copied().ok_or_else(|| PdptwError::data("li_lim: missing field"))
    };
    let parse_usize = |s: &str| -> Result<usize, PdptwError> {
        s.parse().map_err(|_| PdptwError::data(format!("li_lim: expected integer, got {s:?}")))
    };
    let parse_f64 = |s: &str| -> Result<f64, PdptwError> {
        s.parse().map_err(|_| PdptwError::data(format!("li_lim: expected number, got {s:?}")))
    };

    Ok(RawNode {
        id: parse_usize(field(0)?)?,
        x: parse_f64(field(1)?)?,
        y: parse_f64(field(2)?)?,
        demand: parse_f64(field(3)?)? as i32,
        tw_early: parse_f64(field(4)?)?,
        tw_late: parse_f64(field(5)?)?,
        service: parse_f64(field(6)?)?,
        pickup_idx: parse_usize(field(7)?)?,
        delivery_idx: parse_usize(field(8)?)?,
    })
}

/// Parses a Li & Lim format benchmark instance into a validated
/// [`ProblemInstance`], using `params` for the ALNS/driver configuration
/// (the format itself carries no algorithm parameters).
pub fn read_li_lim(text: &str, params: Parameters) -> Result<ProblemInstance, PdptwError> {
    let mut lines = text.lines().filter_map(parse_fields);

    let header = lines
        .next()
        .ok_or_else(|| PdptwError::data("li_lim: empty input, expected a header line"))?;
    if header.len() != 3 {
        return Err(PdptwError::data(format!(
            "li_lim: header must have 3 fields (vehicleCount capacity speed), got {header:?}"
        )));
    }
    let vehicle_count: usize = header[0]
        .parse()
        .map_err(|_| PdptwError::data("li_lim: invalid vehicleCount"))?;
    let capacity: i32 = header[1]
        .parse()
        .map_err(|_| PdptwError::data("li_lim: invalid capacity"))?;
    let speed: f64 = header[2]
        .parse()
        .map_err(|_| PdptwError::data("li_lim: invalid speed"))?;

    let depot_fields = lines
        .next()
        .ok_or_else(|| PdptwError::data("li_lim: missing depot line"))?;
    let depot_raw = parse_raw_node(&depot_fields)?;
    if depot_raw.id != 0 {
        return Err(PdptwError::data(format!(
            "li_lim: depot id must be 0, got {}",
            depot_raw.id
        )));
    }

    let customers: Vec<RawNode> = lines
        .map(|fields| parse_raw_node(&fields))
        .collect::<Result<_, _>>()?;
    for c in &customers {
        if c.id == 0 {
            return Err(PdptwError::data("li_lim: customer node id must not be 0"));
        }
    }

    let depot_template = Node::new(
        0,
        depot_raw.x,
        depot_raw.y,
        depot_raw.tw_early,
        depot_raw.tw_late,
        depot_raw.service,
        0,
    );

    let max_customer_id = customers.iter().map(|c| c.id).max().unwrap_or(0);
    let mut nodes = vec![depot_template; max_customer_id + 1];
    for c in &customers {
        nodes[c.id] = Node::new(c.id, c.x, c.y, c.tw_early, c.tw_late, c.service, c.demand);
    }

    let mut next_id = max_customer_id + 1;
    let mut vehicles = Vec::with_capacity(vehicle_count);
    for vehicle_id in 0..vehicle_count {
        let start_depot_id = next_id;
        nodes.push(depot_template.with_id(start_depot_id));
        next_id += 1;
        let end_depot_id = next_id;
        nodes.push(depot_template.with_id(end_depot_id));
        next_id += 1;
        vehicles.push(Vehicle::new(vehicle_id, capacity, speed, start_depot_id, end_depot_id));
    }

    let all_vehicle_ids: BTreeSet<usize> = (0..vehicle_count).collect();
    let mut requests = Vec::new();
    let mut next_request_id = 0usize;
    for c in &customers {
        if c.demand > 0 && c.delivery_idx != 0 {
            let delivery = customers
                .iter()
                .find(|d| d.id == c.delivery_idx)
                .ok_or_else(|| {
                    PdptwError::data(format!(
                        "li_lim: pickup {} references missing delivery node {}",
                        c.id, c.delivery_idx
                    ))
                })?;
            if c.demand.unsigned_abs() != delivery.demand.unsigned_abs() {
                return Err(PdptwError::data(format!(
                    "li_lim: pickup {} demand {} does not match delivery {} demand {}",
                    c.id, c.demand, delivery.id, delivery.demand
                )));
            }
            if delivery.pickup_idx != c.id {
                return Err(PdptwError::data(format!(
                    "li_lim: delivery {} pickupIdx {} does not point back to pickup {}",
                    delivery.id, delivery.pickup_idx, c.id
                )));
            }
            requests.push(Request::new(
                next_request_id,
                c.id,
                delivery.id,
                c.demand,
                all_vehicle_ids.clone(),
            ));
            next_request_id += 1;
        }
    }
    ProblemInstance::new(nodes, depot_template, requests, vehicles, params)
}
