//! Error types for the PDPTW solver.
//!
//! [`PdptwError`] covers the hard-failure kinds from the error handling
//! design: configuration, malformed input data, broken invariants, and the
//! two-stage driver's convergence failure. Insertion infeasibility is
//! deliberately *not* part of this enum — it is an expected outcome of
//! trial operations and is represented by [`Feasibility`] instead, so the
//! hot path never pays for error-style control flow.

use thiserror::Error;

/// Fatal error kinds surfaced by the solver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PdptwError {
    /// A `Parameters` value failed range or cross-field validation.
    #[error("config error: {0}")]
    Config(String),

    /// Benchmark input was malformed (bad depot id, dangling delivery index,
    /// demand mismatch between a pickup and its paired delivery, ...).
    #[error("data error: {0}")]
    Data(String),

    /// An internal invariant was violated. This always indicates an engine
    /// bug, never a feasibility outcome — it is fatal and should never be
    /// caught and ignored outside the two-stage driver's `AlgorithmWarning`
    /// boundary.
    #[error("state violation: {0}")]
    StateViolation(String),

    /// Phase A of the two-stage driver could not reach feasibility: the same
    /// request failed insertion twice in a row even after a vehicle was
    /// added, or the 1000-attempt safety cap was hit.
    #[error("convergence error: {0}")]
    Convergence(String),
}

impl PdptwError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn state_violation(msg: impl Into<String>) -> Self {
        Self::StateViolation(msg.into())
    }

    pub fn convergence(msg: impl Into<String>) -> Self {
        Self::Convergence(msg.into())
    }

    /// `true` for [`PdptwError::StateViolation`] — the one kind that must
    /// never be swallowed, even by the two-stage driver's `AlgorithmWarning`
    /// handling (§7, §9 open question).
    pub fn is_state_violation(&self) -> bool {
        matches!(self, Self::StateViolation(_))
    }
}

/// Result of a trial operation that can be infeasible without being an error.
///
/// Used by [`crate::route::Route`] and [`crate::solution::Solution`] trial
/// methods (insertion / optimal insertion) so callers handle "no feasible
/// position" as ordinary control flow rather than via `Result`'s `?`.
#[derive(Debug, Clone, PartialEq)]
pub enum Feasibility<T> {
    /// The operation succeeded, carrying its result.
    Feasible(T),
    /// No feasible outcome exists (time window or capacity violated at some
    /// index).
    Infeasible,
}

impl<T> Feasibility<T> {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Self::Feasible(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Feasible(v) => Some(v),
            Self::Infeasible => None,
        }
    }

    pub fn as_ref(&self) -> Feasibility<&T> {
        match self {
            Self::Feasible(v) => Feasibility::Feasible(v),
            Self::Infeasible => Feasibility::Infeasible,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Feasibility<U> {
        match self {
            Self::Feasible(v) => Feasibility::Feasible(f(v)),
            Self::Infeasible => Feasibility::Infeasible,
        }
    }
}

/// Non-fatal warning raised when the two-stage driver's inner ALNS call
/// returns an error during Phase B shrinking. The driver catches this,
/// stops shrinking, and returns the best snapshot — but only for error
/// kinds that represent "no further shrink possible", never for
/// [`PdptwError::StateViolation`], which is re-raised immediately (§9 open
/// question: distinguishing expected termination from a bug).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("algorithm warning during shrink: {0}")]
pub struct AlgorithmWarning(pub String);
