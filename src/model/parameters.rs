//! ALNS/two-stage driver parameters (§6.2).

use serde::{Deserialize, Serialize};

use crate::error::PdptwError;

/// Complete, range-validated configuration for the ALNS engine and the
/// two-stage driver. Defaults match §6.2 exactly.
///
/// # Examples
///
/// ```
/// use pdptw_alns::model::Parameters;
///
/// let params = Parameters::default();
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub alpha: f64,
    pub beta: f64,
    pub gama: f64,
    pub shaw_w1: f64,
    pub shaw_w2: f64,
    pub shaw_w3: f64,
    pub shaw_w4: f64,
    pub p: u32,
    pub p_worst: u32,
    pub w: f64,
    pub annealing_p: f64,
    pub c_cool: f64,
    pub r: f64,
    pub reward_adds: (u32, u32, u32),
    pub eta: f64,
    pub initial_weight: f64,
    pub iteration_num: u32,
    pub epsilon: f64,
    pub segment_num: u32,
    pub theta: u32,
    pub tau: u32,
    pub remove_upper_bound: u32,
    pub remove_lower_bound: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1e-6,
            gama: 1e9,
            shaw_w1: 9.0,
            shaw_w2: 3.0,
            shaw_w3: 3.0,
            shaw_w4: 5.0,
            p: 6,
            p_worst: 3,
            w: 0.05,
            annealing_p: 0.5,
            c_cool: 0.99975,
            r: 0.1,
            reward_adds: (10, 6, 3),
            eta: 0.025,
            initial_weight: 1.0,
            iteration_num: 25_000,
            epsilon: 0.4,
            segment_num: 50,
            theta: 25_000,
            tau: 2_000,
            remove_upper_bound: 100,
            remove_lower_bound: 4,
        }
    }
}

impl Parameters {
    /// Validates every field's range and the cross-field constraints the
    /// ALNS engine relies on (e.g. `remove_upper_bound >= remove_lower_bound`).
    /// Fails fast with a [`PdptwError::Config`].
    pub fn validate(&self) -> Result<(), PdptwError> {
        fn positive(name: &str, v: f64) -> Result<(), PdptwError> {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(PdptwError::config(format!("{name} must be > 0, got {v}")))
            }
        }
        fn unit_open(name: &str, v: f64) -> Result<(), PdptwError> {
            if v > 0.0 && v < 1.0 {
                Ok(())
            } else {
                Err(PdptwError::config(format!(
                    "{name} must be in (0, 1), got {v}"
                )))
            }
        }
        fn unit_half_open(name: &str, v: f64) -> Result<(), PdptwError> {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(PdptwError::config(format!(
                    "{name} must be in (0, 1], got {v}"
                )))
            }
        }
        fn at_least_one(name: &str, v: u32) -> Result<(), PdptwError> {
            if v >= 1 {
                Ok(())
            } else {
                Err(PdptwError::config(format!("{name} must be >= 1, got {v}")))
            }
        }

        positive("alpha", self.alpha)?;
        positive("beta", self.beta)?;
        positive("gama", self.gama)?;
        at_least_one("p", self.p)?;
        at_least_one("p_worst", self.p_worst)?;
        unit_open("w", self.w)?;
        unit_open("annealing_p", self.annealing_p)?;
        unit_open("c_cool", self.c_cool)?;
        unit_open("r", self.r)?;
        unit_half_open("eta", self.eta)?;
        positive("initial_weight", self.initial_weight)?;
        at_least_one("iteration_num", self.iteration_num)?;
        unit_half_open("epsilon", self.epsilon)?;
        at_least_one("segment_num", self.segment_num)?;
        at_least_one("theta", self.theta)?;
        at_least_one("tau", self.tau)?;
        at_least_one("remove_upper_bound", self.remove_upper_bound)?;
        at_least_one("remove_lower_bound", self.remove_lower_bound)?;

        if self.remove_upper_bound < self.remove_lower_bound {
            return Err(PdptwError::config(format!(
                "remove_upper_bound ({}) must be >= remove_lower_bound ({})",
                self.remove_upper_bound, self.remove_lower_bound
            )));
        }

        for (name, w) in [
            ("shaw_w1", self.shaw_w1),
            ("shaw_w2", self.shaw_w2),
            ("shaw_w3", self.shaw_w3),
            ("shaw_w4", self.shaw_w4),
        ] {
            if w < 0.0 || !w.is_finite() {
                return Err(PdptwError::config(format!(
                    "{name} must be >= 0, got {w}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn rejects_negative_alpha() {
        let mut p = Parameters::default();
        p.alpha = -1.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_qhi_below_qlo() {
        let mut p = Parameters::default();
        p.remove_upper_bound = 2;
        p.remove_lower_bound = 4;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_c_cool() {
        let mut p = Parameters::default();
        p.c_cool = 1.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_zero_iteration_num() {
        let mut p = Parameters::default();
        p.iteration_num = 0;
        assert!(p.validate().is_err());
    }
}
