pub mod create_rule;
pub mod queries;
pub mod update_rule;

pub use create_rule::{create_rule, CreateRuleInput, RuleWithVersion};
pub use queries::{deactivate_rule, get_rule, list_rule_versions, list_rules, RuleListResponse};
pub use update_rule::{update_rule, UpdateRuleInput};
