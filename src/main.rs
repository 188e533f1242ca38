use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use sftr::SftrError;
use sftr::config::parse_policy_file;
use sftr::error::exit_code;
use sftr::hooks::DEFAULT_SHELL;
use sftr::request::Request;
use sftr::rules::validate_policy;

const USAGE: &str = "\
It is assumed this program is used as a forced command as described in sshd(8)
and $SSH_ORIGINAL_COMMAND and $SSH_CONNECTION are set in the environment.
$SSH_ORIGINAL_COMMAND must consist of an operation and an operand. Depending
on whether the operation is \"put\" or \"get\", writes to or reads from the file
indicated by the operand, using standard input and output as appropriate.";

#[derive(Parser)]
#[command(name = "sftr")]
#[command(
	author,
	version,
	about = "SSH forced command that gates single-file put/get transfers",
	after_help = USAGE
)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Policy file (YAML, or TOML when the name ends in .toml)
	#[arg(
		long,
		global = true,
		value_name = "PATH",
		env = "SFTR_CONFIG",
		default_value = "sftr.yaml"
	)]
	config: PathBuf,

	/// Shell used to run script post-actions
	#[arg(
		long,
		global = true,
		value_name = "PATH",
		env = "SFTR_SHELL",
		default_value = DEFAULT_SHELL
	)]
	shell: PathBuf,

	/// Log each matching step at debug level
	#[arg(short, long, global = true)]
	verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Policy management commands
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Display the loaded policy
	Show,
	/// Check every rule's network and path patterns without serving a request
	Validate,
}

fn main() -> ExitCode {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(e) => {
			let code = match e.kind() {
				ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_code::SUCCESS,
				_ => exit_code::INVOCATION,
			};
			let _ = e.print();
			return ExitCode::from(code);
		}
	};

	init_logging(cli.verbose);

	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("error: {e:?}");
			ExitCode::from(exit_code_for(&e))
		}
	}
}

/// Logs go to stderr; stdout carries file contents for `get`.
fn init_logging(verbose: bool) {
	let default_level = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(default_level))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.with_ansi(io::stderr().is_terminal())
		.init();
}

/// Map an error chain back to the exit code of its root `SftrError`.
fn exit_code_for(err: &anyhow::Error) -> u8 {
	err.chain()
		.find_map(|cause| cause.downcast_ref::<SftrError>())
		.map(SftrError::exit_code)
		.unwrap_or(exit_code::INVOCATION)
}

fn run(cli: Cli) -> Result<()> {
	if let Some(command) = cli.command {
		return match command {
			Commands::Config { action } => match action {
				ConfigAction::Show => handle_config_show(&cli.config),
				ConfigAction::Validate => handle_config_validate(&cli.config),
			},
		};
	}

	handle_request(&cli.config, &cli.shell)
}

fn handle_request(config_path: &Path, shell: &Path) -> Result<()> {
	tracing::info!("Starting sftr");

	// Environment first, so a bad invocation is reported before the policy is read
	let request = Request::from_env().context("Invalid invocation")?;
	tracing::debug!(?request, "Parsed request");

	let policy = parse_policy_file(config_path)
		.with_context(|| format!("Failed to load policy {}", config_path.display()))?;
	tracing::debug!(rules = policy.resources.len(), "Loaded policy");

	sftr::process(
		&request,
		&policy,
		shell,
		&mut io::stdin().lock(),
		&mut io::stdout().lock(),
	)
	.with_context(|| {
		format!(
			"Request {} {} refused or failed",
			request.operation, request.target_path
		)
	})?;

	Ok(())
}

fn handle_config_show(config_path: &Path) -> Result<()> {
	let policy = parse_policy_file(config_path)
		.with_context(|| format!("Failed to load policy {}", config_path.display()))?;

	println!("# Source: {}", config_path.display());
	println!("# clients: {}", policy.clients.len());
	println!("# resources: {}", policy.resources.len());
	println!();

	for (i, rule) in policy.resources.iter().enumerate() {
		println!("  Rule {}:", i);
		println!("    paths: {}", rule.paths.join(", "));
		println!("    op: {}", rule.op);
		println!("    from: {}", rule.from);
		println!("    post-action: {}", rule.post_action().kind());
		if let Some(ref command) = rule.command {
			println!("    command: {}", command.join(" "));
		}
		if let Some(ref script) = rule.script {
			println!("    script: {} line(s)", script.lines().count());
		}
		println!();
	}

	Ok(())
}

fn handle_config_validate(config_path: &Path) -> Result<()> {
	let policy = parse_policy_file(config_path)
		.with_context(|| format!("Failed to load policy {}", config_path.display()))?;

	validate_policy(&policy)
		.with_context(|| format!("Invalid policy {}", config_path.display()))?;

	for (i, rule) in policy.resources.iter().enumerate() {
		if rule.has_conflicting_post_actions() {
			println!(
				"warning: rule {} sets both command and script; only the command runs",
				i
			);
		}
	}

	println!(
		"Policy is valid: {} ({} rules)",
		config_path.display(),
		policy.resources.len()
	);
	Ok(())
}
