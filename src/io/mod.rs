//! Minimal reference I/O (§6.1). Not a general benchmark-format subsystem —
//! just enough to turn a Li & Lim text file into a [`ProblemInstance`](crate::model::ProblemInstance).

mod li_lim;

pub use li_lim::read_li_lim;
