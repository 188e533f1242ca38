use crate::config::types::PostAction;
use crate::error::{Result, SftrError};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;

/// Shell used for script post-actions unless overridden.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Captured result of a post-action that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostActionOutput {
	/// Interleaved stdout and stderr.
	pub output: Vec<u8>,
}

impl PostActionOutput {
	pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.output)
	}
}

/// Run a rule's post-action.
///
/// Returns `Ok(None)` when the rule has none. A post-action that cannot be
/// started or exits unsuccessfully is an error; its output is logged first.
pub fn run_post_action(action: PostAction<'_>, shell: &Path) -> Result<Option<PostActionOutput>> {
	match action {
		PostAction::None => Ok(None),
		PostAction::Command(argv) => {
			tracing::info!(command = ?argv, "Found command");
			let output = run_command(argv)?;
			tracing::info!("Command: {}", output.as_text());
			Ok(Some(output))
		}
		PostAction::Script(body) => {
			tracing::info!(shell = %shell.display(), "Found script");
			let output = run_script(shell, body)?;
			tracing::info!("Script: {}", output.as_text());
			Ok(Some(output))
		}
	}
}

/// Run `argv[0]` with the remaining arguments, no shell involved.
pub fn run_command(argv: &[String]) -> Result<PostActionOutput> {
	let Some((program, args)) = argv.split_first() else {
		return Err(exec_failed(
			"<empty>",
			io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
		));
	};

	let mut cmd = Command::new(program);
	cmd.args(args).stdin(Stdio::null());

	let (child, mut reader) = spawn_combined(cmd, program)?;
	let mut output = Vec::new();
	reader
		.read_to_end(&mut output)
		.map_err(|source| exec_failed(program, source))?;

	finish(child, program, output)
}

/// Run `body` through `shell`, feeding it on stdin.
///
/// The script is written from a separate thread so a shell that produces
/// output before consuming all of its input cannot deadlock against us.
pub fn run_script(shell: &Path, body: &str) -> Result<PostActionOutput> {
	let program = shell.to_string_lossy().to_string();

	let mut cmd = Command::new(shell);
	cmd.stdin(Stdio::piped());

	let (mut child, mut reader) = spawn_combined(cmd, &program)?;
	let mut stdin = child
		.stdin
		.take()
		.ok_or_else(|| exec_failed(&program, io::Error::other("shell did not expose a writable stdin")))?;

	let script = body.to_owned();
	let writer = thread::spawn(move || -> io::Result<()> {
		stdin.write_all(script.as_bytes())?;
		// Dropping stdin closes the pipe and lets the shell see EOF.
		drop(stdin);
		Ok(())
	});

	let mut output = Vec::new();
	let read_result = reader.read_to_end(&mut output);

	match writer.join() {
		Ok(Ok(())) => {}
		Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
			tracing::debug!("shell exited before reading the whole script");
		}
		Ok(Err(source)) => return Err(exec_failed(&program, source)),
		Err(_) => {
			return Err(exec_failed(
				&program,
				io::Error::other("script writer thread panicked"),
			));
		}
	}

	read_result.map_err(|source| exec_failed(&program, source))?;
	finish(child, &program, output)
}

/// Spawn `cmd` with stdout and stderr sharing one pipe.
fn spawn_combined(mut cmd: Command, program: &str) -> Result<(Child, io::PipeReader)> {
	let (reader, writer) = io::pipe().map_err(|source| exec_failed(program, source))?;
	let stderr = writer
		.try_clone()
		.map_err(|source| exec_failed(program, source))?;
	cmd.stdout(writer).stderr(stderr);

	let child = cmd.spawn().map_err(|source| exec_failed(program, source))?;
	// The command holds the write ends; drop it so the reader sees EOF when
	// the child exits.
	drop(cmd);

	Ok((child, reader))
}

fn finish(mut child: Child, program: &str, output: Vec<u8>) -> Result<PostActionOutput> {
	let status = child.wait().map_err(|source| exec_failed(program, source))?;
	let output = PostActionOutput { output };

	if !status.success() {
		tracing::info!("{}: {}", program, output.as_text());
		return Err(SftrError::PostExecNonZeroExit {
			program: program.to_string(),
			status: status.to_string(),
		});
	}

	Ok(output)
}

fn exec_failed(program: &str, source: io::Error) -> SftrError {
	SftrError::PostExecFailed {
		program: program.to_string(),
		source,
	}
}
