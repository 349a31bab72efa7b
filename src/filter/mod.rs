pub mod engine;
pub mod projection;
pub mod rules;

pub use engine::{FilterEngine, FilterReport};
pub use projection::{BamFilterEngine, ProjectionStats};
pub use rules::{Classifier, Metric, Operator, Predicate, Rule, RuleSet};
