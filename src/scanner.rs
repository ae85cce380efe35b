use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use encoding_rs::UTF_8;
use tracing::warn;

use crate::models::logs::LogFile;
use crate::reader::{ReadError, ReverseReader};

/// Chunk size for the backward reader, per file.
pub const READ_BUFFER_SIZE: usize = 4096;

/// How many leading bytes to inspect when deciding whether an
/// extensionless file is plain text.
const SNIFF_BYTES: usize = 1024;

/// Scans `target` for log content, recursing into directories, and returns
/// one entry per file checked. Faults are isolated per entry: a missing
/// path, an unlistable directory, or a file that fails mid-read each
/// yield an error entry without aborting the rest of the scan.
///
/// `file_path` on every entry is reported relative to `root` (platform
/// separators), regardless of recursion depth. `max_lines` of `None`
/// means unlimited; boundary validation rejects non-positive caller
/// values before this is reached.
pub fn scan_logs(
    target: &Path,
    root: &Path,
    max_lines: Option<usize>,
    search_term: Option<&str>,
) -> Vec<LogFile> {
    let mut logs = Vec::new();

    if !target.exists() {
        logs.push(LogFile::with_error(
            file_name_of(target),
            relative_path(target, root),
            "The specified file does not exist",
        ));
    } else if target.is_dir() {
        scan_directory(target, root, max_lines, search_term, &mut logs);
    } else if target.is_file() {
        // An explicitly requested file explains why nothing was returned;
        // the same file discovered during a walk would be skipped quietly.
        if let Some(log) = read_file(target, root, max_lines, search_term, true) {
            logs.push(log);
        }
    }

    logs
}

fn scan_directory(
    dir: &Path,
    root: &Path,
    max_lines: Option<usize>,
    search_term: Option<&str>,
    logs: &mut Vec<LogFile>,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "cannot access directory");
            logs.push(LogFile::with_error(
                file_name_of(dir),
                relative_path(dir, root),
                "This directory could not be accessed",
            ));
            return;
        }
    };

    // Sorted so traversal order is stable within one scan.
    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    children.sort();

    for child in children {
        if child.is_dir() {
            scan_directory(&child, root, max_lines, search_term, logs);
        } else if child.is_file()
            && let Some(log) = read_file(&child, root, max_lines, search_term, false)
        {
            logs.push(log);
        }
    }
}

/// Reads one file backward, newest line first, keeping lines that are
/// non-blank and contain the search term. Returns `None` for a
/// non-text file found during a walk; `explicit` requests get an error
/// entry instead so the caller learns why nothing came back.
fn read_file(
    path: &Path,
    root: &Path,
    max_lines: Option<usize>,
    search_term: Option<&str>,
    explicit: bool,
) -> Option<LogFile> {
    let file_name = file_name_of(path);
    let file_path = relative_path(path, root);

    if !is_text_like(path) {
        if explicit {
            return Some(LogFile::with_error(
                file_name,
                file_path,
                "This file is not a text file",
            ));
        }
        return None;
    }

    match collect_lines(path, max_lines, search_term) {
        Ok(lines) => Some(LogFile::with_lines(file_name, file_path, lines)),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "exception reading file");
            Some(LogFile::with_error(
                file_name,
                file_path,
                "Encountered an exception reading the file",
            ))
        }
    }
}

fn collect_lines(
    path: &Path,
    max_lines: Option<usize>,
    search_term: Option<&str>,
) -> Result<Vec<String>, ReadError> {
    let mut reader = ReverseReader::new(UTF_8, path, READ_BUFFER_SIZE)?;
    let mut lines = Vec::new();

    while reader.has_more_data() && max_lines.is_none_or(|max| lines.len() < max) {
        if let Some(line) = reader.read_line()?
            && !line.trim().is_empty()
            && search_term.is_none_or(|term| line.contains(term))
        {
            lines.push(line);
        }
    }

    Ok(lines)
}

/// Readable log content is anything named `*.log`/`*.txt`, or whose
/// leading bytes look like plain text. Sniff failures count as binary.
fn is_text_like(path: &Path) -> bool {
    let by_extension = matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref(),
        Some("log") | Some("txt")
    );
    by_extension || sniffs_as_text(path)
}

fn sniffs_as_text(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut head = [0u8; SNIFF_BYTES];
    let Ok(read) = file.read(&mut head) else {
        return false;
    };
    let head = &head[..read];

    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut off by the sniff window is fine.
        Err(err) => err.error_len().is_none(),
    }
}

fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
