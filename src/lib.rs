pub mod analyzers;
pub mod calendar;
pub mod config;
pub mod ledger;
pub mod output;
pub mod reports;
pub mod rules;
pub mod source;
pub mod trip;
pub mod vehicle_model;

pub use analyzers::classifier::{ClassifiedTrip, Exclusion, classify_trip, try_classify};
pub use analyzers::evaluator::evaluate_rule;
pub use analyzers::status::ConsumptionStatus;
pub use analyzers::types::RuleEvaluationResult;
pub use vehicle_model::canonicalize_model;
