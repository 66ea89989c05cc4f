pub mod execution;
pub mod rule;
pub mod rule_version;

pub use execution::{ExecutionResult, RuleExecution};
pub use rule::{ActiveRule, Rule, RuleFilter};
pub use rule_version::RuleVersion;
