//! Alert rules and their evaluation.

pub mod evaluator;
pub mod rule;

pub use evaluator::{ condition_met, evaluate_rules };
pub use rule::{ NewRule, Rule, RuleRecord, RuleState, MIN_REPEAT_INTERVAL_MS };
