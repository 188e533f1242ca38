//! Post-action execution for sftr.
//!
//! This module handles:
//! - Running a rule's argv-style command after a successful `put`
//! - Feeding a rule's script body to a shell
//! - Capturing combined stdout/stderr for the log

pub mod executor;

pub use executor::{
	DEFAULT_SHELL, PostActionOutput, run_command, run_post_action, run_script,
};
