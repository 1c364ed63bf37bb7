use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::{fs, io};

/// Reads a whole text file into a `String`.
///
/// - Reads the entire file into memory
/// - The caller splits on whitespace as needed
pub(crate) fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents)
}

/// Creates a directory (and parents) if it does not exist yet.
///
/// Used before writing artifact files.
pub(crate) fn ensure_dir<P: AsRef<Path>>(dir: P) -> io::Result<()> {
	fs::create_dir_all(dir)
}
