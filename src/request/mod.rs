//! Inbound request extraction.
//!
//! sshd runs sftr as a forced command and passes the connection details and
//! the client's requested command through the environment.

use crate::config::Operation;
use crate::error::{Result, SftrError};
use std::ffi::OsString;
use std::net::IpAddr;

/// Connection details: `client_ip client_port server_ip server_port`.
pub const SSH_CONNECTION: &str = "SSH_CONNECTION";

/// The command line the client asked for, e.g. `put /in/report.txt`.
pub const SSH_ORIGINAL_COMMAND: &str = "SSH_ORIGINAL_COMMAND";

/// A single transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
	/// Client address. IPv4-mapped IPv6 addresses are stored as IPv4.
	pub source_address: IpAddr,

	/// Requested operation.
	pub operation: Operation,

	/// Target path, compared against rule patterns.
	pub target_path: String,
}

impl Request {
	/// Build a request from `SSH_CONNECTION` and `SSH_ORIGINAL_COMMAND`.
	pub fn from_env() -> Result<Self> {
		let connection = decode_env(SSH_CONNECTION, std::env::var_os(SSH_CONNECTION))?;
		let command = decode_env(SSH_ORIGINAL_COMMAND, std::env::var_os(SSH_ORIGINAL_COMMAND))?;
		Self::parse(connection.as_deref(), command.as_deref())
	}

	/// Build a request from the raw connection descriptor and command string.
	///
	/// Only the first token of the connection descriptor and the first two
	/// tokens of the command are used; anything after them is ignored.
	pub fn parse(connection: Option<&str>, command: Option<&str>) -> Result<Self> {
		let connection = connection.ok_or(SftrError::MissingConnection)?;
		let source_address = parse_source_address(connection)?;

		let command = command.ok_or(SftrError::MissingCommand)?;
		let mut tokens = command.split_whitespace();
		let (Some(op), Some(path)) = (tokens.next(), tokens.next()) else {
			return Err(SftrError::MissingOperationOrPath);
		};

		let operation = op
			.parse::<Operation>()
			.map_err(|()| SftrError::UnsupportedOperation { op: op.to_string() })?;

		Ok(Request {
			source_address,
			operation,
			target_path: path.to_string(),
		})
	}
}

/// An unset variable is `None`; a set but non-UTF-8 one is an error.
fn decode_env(name: &'static str, value: Option<OsString>) -> Result<Option<String>> {
	value
		.map(|v| {
			v.into_string()
				.map_err(|_| SftrError::NonUnicodeEnvironment { name })
		})
		.transpose()
}

fn parse_source_address(connection: &str) -> Result<IpAddr> {
	let first = connection.split_whitespace().next().unwrap_or_default();
	let addr: IpAddr = first
		.parse()
		.map_err(|_| SftrError::InvalidSourceAddress {
			value: first.to_string(),
		})?;

	Ok(normalize(addr))
}

/// Collapse IPv4-mapped IPv6 addresses to IPv4 so IPv4 networks contain them.
fn normalize(addr: IpAddr) -> IpAddr {
	match addr {
		IpAddr::V6(v6) => v6
			.to_ipv4_mapped()
			.map(IpAddr::V4)
			.unwrap_or(IpAddr::V6(v6)),
		v4 => v4,
	}
}
