//! Error types of the decomposition pipeline.
//!
//! Every error here is a precondition or phase-ordering violation by the
//! caller, never a recoverable data condition. Continuing after one of
//! these would corrupt the merge and translation bookkeeping, so they are
//! surfaced as typed results and must not be ignored.

use std::error::Error as StdError;
use std::fmt;

/// The phases of one decomposition run, in their mandatory order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Recursive splitting of the grid into homogeneous boxes.
    Split,
    /// Merging of directly adjacent boxes.
    Merge,
    /// Detection of boxes on the periodic boundary.
    Border,
    /// Merging across periodic images.
    Periodic,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split => write!(f, "split"),
            Self::Merge => write!(f, "merge"),
            Self::Border => write!(f, "border detection"),
            Self::Periodic => write!(f, "periodic merge"),
        }
    }
}

/// Errors reported by the decomposition pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A merge was requested for two nodes that are not in each other's
    /// neighbor set. No state is mutated before this is reported.
    NotNeighboring {
        /// Handle of the first node.
        a: usize,
        /// Handle of the second node.
        b: usize,
    },
    /// An operation was attempted in a phase that does not allow it, e.g.
    /// splitting after merging began, or a non-periodic merge after the
    /// periodic phase was entered.
    PhaseViolation {
        /// The phase the pipeline is currently in.
        current: Phase,
        /// The operation that was attempted.
        operation: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNeighboring { a, b } => {
                write!(f, "nodes {a} and {b} are not neighbors")
            }
            Self::PhaseViolation { current, operation } => {
                write!(f, "'{operation}' is not allowed during the {current} phase")
            }
        }
    }
}

impl StdError for Error {}
