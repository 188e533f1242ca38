use crate::config::types::{Policy, Rule};
use crate::error::{Result, SftrError};
use crate::request::Request;
use glob::{MatchOptions, Pattern, PatternError};
use ipnet::IpNet;
use std::net::IpAddr;

/// Glob options for path patterns: `*` and `?` never cross a `/`.
const PATH_MATCH_OPTIONS: MatchOptions = MatchOptions {
	case_sensitive: true,
	require_literal_separator: true,
	require_literal_leading_dot: false,
};

/// A rule that authorized a request, with its position in the policy.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
	/// Zero-based index into `Policy::resources`.
	pub index: usize,

	/// The matching rule.
	pub rule: &'a Rule,
}

/// Find the first rule in declared order that authorizes the request.
///
/// Returns `Ok(None)` when every rule was evaluated and none matched. A
/// malformed network or glob in a rule that is reached aborts the search,
/// while rules after the first match are never examined.
pub fn find_first<'a>(request: &Request, policy: &'a Policy) -> Result<Option<Match<'a>>> {
	for (index, rule) in policy.resources.iter().enumerate() {
		if rule.op != request.operation {
			tracing::debug!(index, op = %rule.op, "rule skipped: operation differs");
			continue;
		}

		if !path_matches(index, &request.target_path, &rule.paths)? {
			tracing::debug!(index, "rule skipped: no path matches");
			continue;
		}

		let network = parse_network(index, &rule.from)?;
		if !network_contains(&network, request.source_address) {
			tracing::debug!(index, %network, "rule skipped: source not in network");
			continue;
		}

		return Ok(Some(Match { index, rule }));
	}

	Ok(None)
}

/// Like [`find_first`], but a request with no matching rule is an error.
pub fn authorize<'a>(request: &Request, policy: &'a Policy) -> Result<Match<'a>> {
	find_first(request, policy)?.ok_or_else(|| SftrError::NoMatch {
		address: request.source_address,
		op: request.operation,
		path: request.target_path.clone(),
	})
}

/// Check a path against a rule's patterns: exact equality first, then glob.
pub fn path_matches(index: usize, path: &str, patterns: &[String]) -> Result<bool> {
	if patterns.iter().any(|p| p == path) {
		return Ok(true);
	}

	for pattern in patterns {
		if compile_pattern(index, pattern)?.matches_with(path, PATH_MATCH_OPTIONS) {
			return Ok(true);
		}
	}

	Ok(false)
}

/// Compile a path pattern as a shell-style glob.
fn compile_pattern(index: usize, pattern: &str) -> Result<Pattern> {
	translate_pattern(pattern)
		.and_then(|translated| Pattern::new(&translated))
		.map_err(|source| SftrError::InvalidPathPattern {
			index,
			pattern: pattern.to_string(),
			source,
		})
}

/// Rewrite a path pattern into `glob` syntax.
///
/// Path patterns use the classic single-segment rules: a run of `*` is one
/// wildcard, `[^...]` negates a class and a backslash escapes the next
/// character. `glob` gives `**` a recursive meaning, spells negation
/// `[!...]` and has no escape character, so each of these is rewritten.
fn translate_pattern(pattern: &str) -> std::result::Result<String, PatternError> {
	let chars: Vec<char> = pattern.chars().collect();
	let mut out = String::with_capacity(pattern.len());
	let mut i = 0;

	while i < chars.len() {
		match chars[i] {
			'*' => {
				while chars.get(i) == Some(&'*') {
					i += 1;
				}
				out.push('*');
			}
			'\\' => {
				let c = *chars
					.get(i + 1)
					.ok_or_else(|| bad_pattern(i, "trailing backslash"))?;
				push_literal(&mut out, c);
				i += 2;
			}
			'[' => i = translate_class(&chars, i, &mut out)?,
			c => {
				out.push(c);
				i += 1;
			}
		}
	}

	Ok(out)
}

fn bad_pattern(pos: usize, msg: &'static str) -> PatternError {
	PatternError { pos, msg }
}

/// Append `c` so that `glob` reads it literally.
fn push_literal(out: &mut String, c: char) {
	match c {
		'*' | '?' | '[' => {
			out.push('[');
			out.push(c);
			out.push(']');
		}
		_ => out.push(c),
	}
}

/// Translate the class opening at `start`; returns the index after its `]`.
fn translate_class(
	chars: &[char],
	start: usize,
	out: &mut String,
) -> std::result::Result<usize, PatternError> {
	let mut i = start + 1;
	let negated = chars.get(i) == Some(&'^');
	if negated {
		i += 1;
	}

	let mut items: Vec<(char, char)> = Vec::new();
	loop {
		match chars.get(i) {
			None => return Err(bad_pattern(start, "unterminated character class")),
			Some(']') if !items.is_empty() => {
				i += 1;
				break;
			}
			_ => {}
		}

		let (lo, next) = class_char(chars, i, start)?;
		i = next;
		let mut hi = lo;
		if chars.get(i) == Some(&'-') {
			let (h, next) = class_char(chars, i + 1, start)?;
			hi = h;
			i = next;
		}
		items.push((lo, hi));
	}

	encode_class(negated, &items, out, start)?;
	Ok(i)
}

/// Read one possibly escaped class member at `i`.
fn class_char(
	chars: &[char],
	i: usize,
	start: usize,
) -> std::result::Result<(char, usize), PatternError> {
	match chars.get(i) {
		None => Err(bad_pattern(start, "unterminated character class")),
		Some('-') | Some(']') => Err(bad_pattern(i, "unescaped '-' or ']' in character class")),
		Some('\\') => chars
			.get(i + 1)
			.map(|c| (*c, i + 2))
			.ok_or_else(|| bad_pattern(start, "unterminated character class")),
		Some(c) => Ok((*c, i + 1)),
	}
}

/// Write a class in `glob` syntax.
///
/// `glob` has no escapes inside a class: `]` is only literal in first
/// position, a leading `!` negates, and any `x-y` triple is a range. Members
/// are ordered to respect that, and the result is re-read the way `glob`
/// reads it; a class that cannot be spelled faithfully is rejected.
fn encode_class(
	negated: bool,
	items: &[(char, char)],
	out: &mut String,
	start: usize,
) -> std::result::Result<(), PatternError> {
	let mut singles: Vec<char> = Vec::new();
	let mut ranges: Vec<(char, char)> = Vec::new();
	for &(lo, hi) in items {
		if lo == hi {
			if !singles.contains(&lo) {
				singles.push(lo);
			}
		} else {
			ranges.push((lo, hi));
		}
	}

	if !negated && ranges.is_empty() && singles.len() == 1 {
		push_literal(out, singles[0]);
		return Ok(());
	}

	let close = singles.contains(&']');
	let dash = singles.contains(&'-');
	singles.retain(|c| *c != ']' && *c != '-');
	// A range starting with '-' is safe right after another range.
	ranges.sort_by_key(|&(lo, _)| lo == '-');

	let mut pieces: Vec<String> = Vec::new();
	if close {
		pieces.push("]".to_string());
	}
	pieces.extend(ranges.iter().map(|(lo, hi)| format!("{lo}-{hi}")));
	pieces.extend(singles.iter().map(|c| c.to_string()));

	if !negated && pieces.first().is_some_and(|p| p.starts_with('!')) {
		if dash {
			pieces.insert(0, "-".to_string());
		} else {
			pieces.rotate_left(1);
		}
	} else if dash {
		pieces.push("-".to_string());
	}

	let body: String = pieces.concat();
	let mut expected: Vec<(char, char)> = items.to_vec();
	if !reads_as(&body, negated, &mut expected) {
		return Err(bad_pattern(start, "character class cannot be expressed"));
	}

	out.push('[');
	if negated {
		out.push('!');
	}
	out.push_str(&body);
	out.push(']');
	Ok(())
}

/// True when `glob` parses `body` as a class over exactly `expected`.
fn reads_as(body: &str, negated: bool, expected: &mut Vec<(char, char)>) -> bool {
	let chars: Vec<char> = body.chars().collect();
	if chars.is_empty() || chars[1..].contains(&']') || (!negated && chars[0] == '!') {
		return false;
	}

	let mut parsed = Vec::new();
	let mut i = 0;
	while i < chars.len() {
		if i + 2 < chars.len() && chars[i + 1] == '-' {
			parsed.push((chars[i], chars[i + 2]));
			i += 3;
		} else {
			parsed.push((chars[i], chars[i]));
			i += 1;
		}
	}

	parsed.sort_unstable();
	parsed.dedup();
	expected.sort_unstable();
	expected.dedup();
	parsed == *expected
}

/// Parse a rule's `from` field as a CIDR network.
pub fn parse_network(index: usize, network: &str) -> Result<IpNet> {
	network
		.parse::<IpNet>()
		.map_err(|source| SftrError::InvalidNetwork {
			index,
			network: network.to_string(),
			source,
		})
}

/// Eagerly check every network and pattern in a policy.
///
/// The gate itself only validates the rules it reaches; this is for
/// operators checking a policy before deploying it.
pub fn validate_policy(policy: &Policy) -> Result<()> {
	for (index, rule) in policy.resources.iter().enumerate() {
		parse_network(index, &rule.from)?;
		for pattern in &rule.paths {
			compile_pattern(index, pattern)?;
		}
	}
	Ok(())
}

/// True when `addr` lies within `network`.
pub fn network_contains(network: &IpNet, addr: IpAddr) -> bool {
	network.contains(&addr)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::types::Operation;

	fn rule(paths: &[&str], op: Operation, from: &str) -> Rule {
		Rule {
			paths: paths.iter().map(|p| p.to_string()).collect(),
			op,
			from: from.to_string(),
			command: None,
			script: None,
		}
	}

	fn policy(resources: Vec<Rule>) -> Policy {
		Policy {
			clients: vec![],
			resources,
		}
	}

	fn request(addr: &str, operation: Operation, path: &str) -> Request {
		Request {
			source_address: addr.parse().unwrap(),
			operation,
			target_path: path.to_string(),
		}
	}

	#[test]
	fn test_exact_path_match() {
		let patterns = vec!["/in/exact.txt".to_string()];
		assert!(path_matches(0, "/in/exact.txt", &patterns).unwrap());
		assert!(!path_matches(0, "/in/exact.txt2", &patterns).unwrap());
		assert!(!path_matches(0, "/in/Exact.txt", &patterns).unwrap());
	}

	#[test]
	fn test_glob_is_single_segment() {
		let patterns = vec!["/uploads/*.csv".to_string()];
		assert!(path_matches(0, "/uploads/data.csv", &patterns).unwrap());
		assert!(!path_matches(0, "/uploads/sub/data.csv", &patterns).unwrap());
		assert!(!path_matches(0, "/uploads/data.csv.bak", &patterns).unwrap());
	}

	#[test]
	fn test_glob_question_mark_and_class() {
		let patterns = vec!["/logs/app-?.[0-9]".to_string()];
		assert!(path_matches(0, "/logs/app-a.7", &patterns).unwrap());
		assert!(!path_matches(0, "/logs/app-ab.7", &patterns).unwrap());
		assert!(!path_matches(0, "/logs/app-a.x", &patterns).unwrap());
	}

	#[test]
	fn test_exact_match_wins_over_bad_glob() {
		// An exact hit never compiles the patterns.
		let patterns = vec!["[".to_string(), "/in/a".to_string()];
		assert!(path_matches(0, "/in/a", &patterns).unwrap());
	}

	#[test]
	fn test_bad_glob_is_configuration_error() {
		let patterns = vec!["/in/[".to_string()];
		let err = path_matches(3, "/in/a", &patterns).unwrap_err();
		assert!(matches!(err, SftrError::InvalidPathPattern { index: 3, .. }));
	}

	fn matches(pattern: &str, path: &str) -> bool {
		path_matches(0, path, &[pattern.to_string()]).unwrap()
	}

	#[test]
	fn test_double_star_stays_in_one_segment() {
		assert!(matches("/uploads/**", "/uploads/x"));
		assert!(!matches("/uploads/**", "/uploads/sub/x"));
		assert!(matches("/uploads/a**.csv", "/uploads/ab.csv"));
		assert!(matches("/uploads/a**.csv", "/uploads/a.csv"));
		assert!(!matches("/uploads/a**.csv", "/uploads/a/b.csv"));
	}

	#[test]
	fn test_caret_negates_class() {
		assert!(matches("/in/[^x].txt", "/in/a.txt"));
		assert!(!matches("/in/[^x].txt", "/in/x.txt"));
		assert!(matches("/in/[^a-c]", "/in/d"));
		assert!(!matches("/in/[^a-c]", "/in/b"));
	}

	#[test]
	fn test_bang_is_literal_in_class() {
		assert!(matches("/in/[!a].txt", "/in/!.txt"));
		assert!(matches("/in/[!a].txt", "/in/a.txt"));
		assert!(!matches("/in/[!a].txt", "/in/b.txt"));
	}

	#[test]
	fn test_backslash_escapes() {
		assert!(matches(r"/in/\*.txt", "/in/*.txt"));
		assert!(!matches(r"/in/\*.txt", "/in/a.txt"));
		assert!(matches(r"/in/\?", "/in/?"));
		assert!(!matches(r"/in/\?", "/in/a"));
		assert!(matches(r"/in/\[x]", "/in/[x]"));
		assert!(matches(r"/in/[\]]", "/in/]"));
		assert!(matches(r"/in/[a\-z]", "/in/-"));
		assert!(matches(r"/in/[a\-z]", "/in/z"));
		assert!(!matches(r"/in/[a\-z]", "/in/m"));
	}

	#[test]
	fn test_malformed_patterns_are_rejected() {
		for pattern in [r"/in/a\", "/in/[ab", "/in/[]", "/in/[^]", "/in/[a-]", "/in/[-a]"] {
			let err = path_matches(1, "/in/a", &[pattern.to_string()]).unwrap_err();
			assert!(
				matches!(err, SftrError::InvalidPathPattern { index: 1, .. }),
				"{pattern} should be rejected"
			);
		}
	}

	#[test]
	fn test_translate_pattern() {
		assert_eq!(translate_pattern("/a/***/b").unwrap(), "/a/*/b");
		assert_eq!(translate_pattern("[^x]").unwrap(), "[!x]");
		assert_eq!(translate_pattern("[!a]").unwrap(), "[a!]");
		assert_eq!(translate_pattern(r"\*").unwrap(), "[*]");
		assert_eq!(translate_pattern(r"[\]a]").unwrap(), "[]a]");
	}

	#[test]
	fn test_network_containment() {
		let net = parse_network(0, "10.0.0.0/24").unwrap();
		assert!(network_contains(&net, "10.0.0.5".parse().unwrap()));
		assert!(!network_contains(&net, "10.0.1.5".parse().unwrap()));
		assert!(!network_contains(&net, "::1".parse().unwrap()));

		let net = parse_network(0, "2001:db8::/32").unwrap();
		assert!(network_contains(&net, "2001:db8::7".parse().unwrap()));
		assert!(!network_contains(&net, "10.0.0.5".parse().unwrap()));
	}

	#[test]
	fn test_network_with_host_bits_set() {
		let net = parse_network(0, "10.0.0.77/24").unwrap();
		assert!(network_contains(&net, "10.0.0.5".parse().unwrap()));
	}

	#[test]
	fn test_bare_address_is_not_a_network() {
		assert!(matches!(
			parse_network(2, "10.0.0.1"),
			Err(SftrError::InvalidNetwork { index: 2, .. })
		));
	}

	#[test]
	fn test_find_first_matches() {
		let p = policy(vec![rule(&["/in/*.txt"], Operation::Put, "192.168.1.0/24")]);
		let req = request("192.168.1.10", Operation::Put, "/in/report.txt");

		let m = find_first(&req, &p).unwrap().unwrap();
		assert_eq!(m.index, 0);
	}

	#[test]
	fn test_find_first_operation_must_match() {
		let p = policy(vec![rule(&["/in/*.txt"], Operation::Put, "192.168.1.0/24")]);
		let req = request("192.168.1.10", Operation::Get, "/in/report.txt");

		assert!(find_first(&req, &p).unwrap().is_none());
	}

	#[test]
	fn test_find_first_outside_network() {
		let p = policy(vec![rule(&["/in/*.txt"], Operation::Put, "192.168.1.0/24")]);
		let req = request("10.0.0.10", Operation::Put, "/in/report.txt");

		assert!(find_first(&req, &p).unwrap().is_none());
		assert!(matches!(
			authorize(&req, &p),
			Err(SftrError::NoMatch { .. })
		));
	}

	#[test]
	fn test_first_match_wins() {
		let mut trusted = rule(&["/in/*"], Operation::Put, "10.0.0.0/24");
		trusted.command = Some(vec!["/bin/echo".to_string(), "trusted".to_string()]);
		let mut fallback = rule(&["/in/*"], Operation::Put, "10.0.0.0/8");
		fallback.command = Some(vec!["/bin/echo".to_string(), "fallback".to_string()]);
		let p = policy(vec![trusted, fallback]);

		let m = find_first(&request("10.0.0.5", Operation::Put, "/in/a"), &p)
			.unwrap()
			.unwrap();
		assert_eq!(m.index, 0);

		let m = find_first(&request("10.9.0.5", Operation::Put, "/in/a"), &p)
			.unwrap()
			.unwrap();
		assert_eq!(m.index, 1);
	}

	#[test]
	fn test_bad_network_before_match_aborts() {
		let p = policy(vec![
			rule(&["/in/a"], Operation::Put, "not-a-network"),
			rule(&["/in/a"], Operation::Put, "0.0.0.0/0"),
		]);
		let req = request("10.0.0.5", Operation::Put, "/in/a");

		assert!(matches!(
			find_first(&req, &p),
			Err(SftrError::InvalidNetwork { index: 0, .. })
		));
	}

	#[test]
	fn test_bad_network_after_match_not_reached() {
		let p = policy(vec![
			rule(&["/in/a"], Operation::Put, "0.0.0.0/0"),
			rule(&["/in/a"], Operation::Put, "not-a-network"),
		]);
		let req = request("10.0.0.5", Operation::Put, "/in/a");

		assert_eq!(find_first(&req, &p).unwrap().unwrap().index, 0);
	}

	#[test]
	fn test_bad_network_on_skipped_rule_not_parsed() {
		// Operation and path are checked before the network is parsed.
		let p = policy(vec![
			rule(&["/in/a"], Operation::Get, "not-a-network"),
			rule(&["/other"], Operation::Put, "not-a-network"),
			rule(&["/in/a"], Operation::Put, "10.0.0.0/8"),
		]);
		let req = request("10.0.0.5", Operation::Put, "/in/a");

		assert_eq!(find_first(&req, &p).unwrap().unwrap().index, 2);
	}

	#[test]
	fn test_empty_policy_finds_nothing() {
		let req = request("10.0.0.5", Operation::Get, "/in/a");
		assert!(find_first(&req, &Policy::default()).unwrap().is_none());
	}

	#[test]
	fn test_validate_policy() {
		let ok = policy(vec![rule(&["/in/*.txt"], Operation::Put, "10.0.0.0/8")]);
		assert!(validate_policy(&ok).is_ok());

		let bad_net = policy(vec![
			rule(&["/in/*.txt"], Operation::Put, "10.0.0.0/8"),
			rule(&["/in/*.txt"], Operation::Put, "10.0.0.0/99"),
		]);
		assert!(matches!(
			validate_policy(&bad_net),
			Err(SftrError::InvalidNetwork { index: 1, .. })
		));

		let bad_glob = policy(vec![rule(&["/in/[a"], Operation::Get, "10.0.0.0/8")]);
		assert!(matches!(
			validate_policy(&bad_glob),
			Err(SftrError::InvalidPathPattern { index: 0, .. })
		));
	}
}
