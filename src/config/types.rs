use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Top-level policy document.
///
/// Unknown fields are rejected anywhere in the document: a typo in a policy
/// file must fail the load rather than silently widen or narrow access.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
	/// Client definitions. Reserved for per-client identity; not consulted
	/// when matching.
	#[serde(default)]
	pub clients: Vec<Client>,

	/// Resource rules. First matching rule wins.
	#[serde(default)]
	pub resources: Vec<Rule>,
}

/// Placeholder for a client definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Client {}

/// The two operations a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
	Put,
	Get,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Operation::Put => "put",
			Operation::Get => "get",
		}
	}
}

impl fmt::Display for Operation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Operation {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"put" => Ok(Operation::Put),
			"get" => Ok(Operation::Get),
			_ => Err(()),
		}
	}
}

/// A resource rule authorizing one operation on a set of paths from one
/// source network.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
	/// Exact paths or shell-style glob patterns.
	#[serde(default)]
	pub paths: Vec<String>,

	/// Operation this rule authorizes.
	pub op: Operation,

	/// CIDR network of trusted client addresses. Parsed when the rule is
	/// reached during matching.
	pub from: String,

	/// Program and arguments to run after a successful `put`.
	#[serde(default)]
	pub command: Option<Vec<String>>,

	/// Shell script body to run after a successful `put` when no command is set.
	#[serde(default)]
	pub script: Option<String>,
}

/// The post-action a rule resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction<'a> {
	None,
	Command(&'a [String]),
	Script(&'a str),
}

impl PostAction<'_> {
	pub fn kind(&self) -> &'static str {
		match self {
			PostAction::None => "none",
			PostAction::Command(_) => "command",
			PostAction::Script(_) => "script",
		}
	}
}

impl Rule {
	/// Resolve the post-action for this rule. A command takes precedence over
	/// a script; empty values count as unset.
	pub fn post_action(&self) -> PostAction<'_> {
		match (&self.command, &self.script) {
			(Some(argv), _) if !argv.is_empty() => PostAction::Command(argv),
			(_, Some(body)) if !body.is_empty() => PostAction::Script(body),
			_ => PostAction::None,
		}
	}

	/// True when both `command` and `script` carry a value. Only the command
	/// runs in that case.
	pub fn has_conflicting_post_actions(&self) -> bool {
		self.command.as_ref().is_some_and(|argv| !argv.is_empty())
			&& self.script.as_ref().is_some_and(|body| !body.is_empty())
	}
}
