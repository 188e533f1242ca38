//! sftr - SSH forced command gating single-file transfers.
//!
//! This library provides the core functionality for sftr, including:
//! - Request extraction from the sshd environment
//! - Strict policy file parsing
//! - First-match rule resolution by operation, path and source network
//! - The `put`/`get` byte transfer
//! - Post-action execution after a successful `put`
//!
//! # Example
//!
//! ```no_run
//! use sftr::config::parse_policy_file;
//! use sftr::request::Request;
//! use sftr::rules::find_first;
//! use std::path::Path;
//!
//! let request = Request::from_env().unwrap();
//! let policy = parse_policy_file(Path::new("sftr.yaml")).unwrap();
//!
//! if let Some(m) = find_first(&request, &policy).unwrap() {
//!     println!("Matched rule {}", m.index);
//! }
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod request;
pub mod rules;
pub mod transfer;

pub use error::{Result, SftrError};

use crate::config::{Operation, Policy};
use crate::hooks::PostActionOutput;
use crate::request::Request;
use std::io::{Read, Write};
use std::path::Path;

/// Authorize and carry out a single request.
///
/// `input` feeds a `put` and `output` receives a `get`. Nothing is opened
/// or run unless a rule authorizes the request. Returns the post-action's
/// output when one ran.
pub fn process<R, W>(
	request: &Request,
	policy: &Policy,
	shell: &Path,
	input: &mut R,
	output: &mut W,
) -> Result<Option<PostActionOutput>>
where
	R: Read + ?Sized,
	W: Write + ?Sized,
{
	let matched = rules::authorize(request, policy)?;
	tracing::info!(
		index = matched.index,
		from = %request.source_address,
		op = %request.operation,
		path = %request.target_path,
		"Request authorized"
	);

	let path = Path::new(&request.target_path);
	match request.operation {
		Operation::Put => {
			let bytes = transfer::put(path, input)?;
			tracing::debug!(bytes, "Upload complete");
			hooks::run_post_action(matched.rule.post_action(), shell)
		}
		Operation::Get => {
			let bytes = transfer::get(path, output)?;
			tracing::debug!(bytes, "Download complete");
			Ok(None)
		}
	}
}
