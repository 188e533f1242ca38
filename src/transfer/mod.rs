//! Byte transfer between the target file and the process's standard streams.
//!
//! No cleanup is attempted when a `put` fails partway: the target is left
//! with whatever was written before the failure.

use crate::error::{Result, SftrError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Mode for files created by `put`: owner read/write only.
pub const PUT_FILE_MODE: u32 = 0o600;

/// Write everything from `input` to `path`, creating or truncating it.
///
/// The file is synced to disk before returning. Returns the number of bytes
/// written.
pub fn put<R: Read + ?Sized>(path: &Path, input: &mut R) -> Result<u64> {
	let mut file = open_for_put(path)?;

	let result = io::copy(input, &mut file).and_then(|n| file.sync_all().map(|()| n));
	drop(file);
	tracing::info!(path = %path.display(), "Closed target file");

	result.map_err(|source| SftrError::FileIo {
		path: path.to_path_buf(),
		source,
	})
}

/// Copy the contents of `path` to `output` and flush it.
///
/// Returns the number of bytes read.
pub fn get<W: Write + ?Sized>(path: &Path, output: &mut W) -> Result<u64> {
	let mut file = File::open(path).map_err(|source| SftrError::FileOpen {
		path: path.to_path_buf(),
		source,
	})?;

	let result = io::copy(&mut file, output).and_then(|n| output.flush().map(|()| n));
	drop(file);
	tracing::info!(path = %path.display(), "Closed source file");

	result.map_err(|source| SftrError::FileIo {
		path: path.to_path_buf(),
		source,
	})
}

fn open_for_put(path: &Path) -> Result<File> {
	let mut options = OpenOptions::new();
	options.write(true).create(true).truncate(true);

	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(PUT_FILE_MODE);
	}

	options.open(path).map_err(|source| SftrError::FileOpen {
		path: path.to_path_buf(),
		source,
	})
}
