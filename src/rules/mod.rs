//! Rule matching for sftr.
//!
//! This module handles:
//! - First-match-wins resolution over the policy's resources
//! - Exact and glob path matching
//! - Source network containment

pub mod matcher;

pub use matcher::{Match, authorize, find_first, path_matches, validate_policy};
