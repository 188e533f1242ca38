//! Policy loading and parsing for sftr.
//!
//! This module handles:
//! - Strict YAML (or TOML) policy file parsing
//! - The rule data model and post-action resolution

pub mod parser;
pub mod types;

pub use parser::{parse_policy_file, parse_policy_str, parse_policy_toml};
pub use types::{Client, Operation, Policy, PostAction, Rule};
