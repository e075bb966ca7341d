//! Trip classification and rule evaluation.
//!
//! Trips are classified against their reference median, grouped per vehicle
//! and checked against each rule's thresholds. Results are recorded in the
//! evaluation ledger and can be published as JSON to S3.

pub mod aggregate;
pub mod analyzer;
pub mod classifier;
pub mod evaluator;
pub mod publish;
pub mod reference;
pub mod status;
pub mod types;
pub mod utility;
