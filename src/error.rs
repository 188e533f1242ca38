use crate::config::Operation;
use std::net::IpAddr;
use std::path::PathBuf;

/// Process exit codes, one per outcome class.
///
/// These values are part of the external contract: wrapper scripts on the
/// client side branch on them, so they must never be renumbered.
pub mod exit_code {
	pub const SUCCESS: u8 = 0;
	pub const NO_MATCH: u8 = 1;
	pub const INVOCATION: u8 = 128;
	pub const CONFIGURATION: u8 = 129;
	pub const FILE_OPEN: u8 = 130;
	pub const FILE_IO: u8 = 131;
	pub const POST_EXECUTION: u8 = 132;
}

/// Library-level structured errors for sftr.
///
/// Use `thiserror` for structured errors that library consumers can match on.
/// The CLI binary wraps these with `anyhow` for rich context chains and maps
/// them back to an exit status with [`SftrError::exit_code`].
#[derive(Debug, thiserror::Error)]
pub enum SftrError {
	#[error("No SSH connection information available")]
	MissingConnection,

	#[error("Could not parse originating IP address from SSH connection information: {value:?}")]
	InvalidSourceAddress { value: String },

	#[error("Environment variable {name} is not valid UTF-8")]
	NonUnicodeEnvironment { name: &'static str },

	#[error("No operation supplied")]
	MissingCommand,

	#[error("Must specify op and path")]
	MissingOperationOrPath,

	#[error("Op '{op}' not valid")]
	UnsupportedOperation { op: String },

	#[error("Failed to read policy file: {path}")]
	ConfigReadError {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse policy file: {path}")]
	ConfigParseError {
		path: PathBuf,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("Failed to parse policy file: {path}")]
	ConfigParseTomlError {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Invalid source network in rule {index}: {network}")]
	InvalidNetwork {
		index: usize,
		network: String,
		#[source]
		source: ipnet::AddrParseError,
	},

	#[error("Invalid path pattern in rule {index}: {pattern}")]
	InvalidPathPattern {
		index: usize,
		pattern: String,
		#[source]
		source: glob::PatternError,
	},

	#[error("No such match for {address} ({op} {path})")]
	NoMatch {
		address: IpAddr,
		op: Operation,
		path: String,
	},

	#[error("Failed to open {path}")]
	FileOpen {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Transfer failed for {path}")]
	FileIo {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Post-action failed: {program}")]
	PostExecFailed {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("Post-action returned non-zero exit status: {program} ({status})")]
	PostExecNonZeroExit { program: String, status: String },
}

impl SftrError {
	/// The process exit code for this error's outcome class.
	pub fn exit_code(&self) -> u8 {
		match self {
			SftrError::MissingConnection
			| SftrError::InvalidSourceAddress { .. }
			| SftrError::NonUnicodeEnvironment { .. }
			| SftrError::MissingCommand
			| SftrError::MissingOperationOrPath
			| SftrError::UnsupportedOperation { .. } => exit_code::INVOCATION,
			SftrError::ConfigReadError { .. }
			| SftrError::ConfigParseError { .. }
			| SftrError::ConfigParseTomlError { .. }
			| SftrError::InvalidNetwork { .. }
			| SftrError::InvalidPathPattern { .. } => exit_code::CONFIGURATION,
			SftrError::NoMatch { .. } => exit_code::NO_MATCH,
			SftrError::FileOpen { .. } => exit_code::FILE_OPEN,
			SftrError::FileIo { .. } => exit_code::FILE_IO,
			SftrError::PostExecFailed { .. } | SftrError::PostExecNonZeroExit { .. } => {
				exit_code::POST_EXECUTION
			}
		}
	}
}

/// Result type alias using SftrError.
pub type Result<T> = std::result::Result<T, SftrError>;
