//! Source inspection (ambient external collaborator, spec §1 out-of-scope
//! "source reader" treated as a pluggable dependency via this trait).
//!
//! Two responsibilities live here: finding the first executable line of a
//! module (skipping blank lines, comments, and a leading docstring, the way
//! `start_debugger` picks where to plant its temporary breakpoint) and
//! rendering a window of source around a line for the `list` command.

use crate::error::Error;

pub trait SourceInspector: Send + Sync {
    fn read_lines(&self, path: &str) -> Result<Vec<String>, Error>;
}

/// Reads source directly off the local filesystem. The debuggee and this
/// client are assumed to share a filesystem, as the original tool assumed.
pub struct FileSourceInspector;

impl SourceInspector for FileSourceInspector {
    fn read_lines(&self, path: &str) -> Result<Vec<String>, Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(contents.lines().map(str::to_owned).collect())
    }
}

/// 1-indexed. Skips leading blank lines and `#`-comments, then, if the
/// first remaining statement is a triple-quoted docstring, skips past its
/// closing delimiter. Returns `None` for a file with no executable content.
///
/// Unlike the source reader's line-numbering used for `list` below (chosen
/// independently, since the source reader itself is not part of the wire
/// protocol this client implements), this mirrors the original tool's
/// docstring-skipping exactly since `start_debugger` relies on it to match
/// where the debuggee itself will actually stop.
pub fn first_executable_line(lines: &[String]) -> Option<u32> {
    let mut i = 0;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        for delim in ["\"\"\"", "'''"] {
            if let Some(after_open) = trimmed.strip_prefix(delim) {
                if after_open.contains(delim) {
                    return Some(i as u32 + 1);
                }
                let mut j = i + 1;
                while j < lines.len() {
                    if lines[j].contains(delim) {
                        return Some(j as u32 + 1);
                    }
                    j += 1;
                }
                return Some(i as u32 + 1);
            }
        }
        return Some(i as u32 + 1);
    }
    None
}

/// A window of source for the `list` command: `(line_number, text)` pairs,
/// using absolute 1-indexed file line numbers (clipped to file bounds).
pub fn list_window(lines: &[String], current_line: u32, context: u32) -> Vec<(u32, String)> {
    let current = current_line.max(1);
    let start = current.saturating_sub(context).max(1);
    let end = (current + context).min(lines.len() as u32);
    (start..=end)
        .filter_map(|n| lines.get((n - 1) as usize).map(|l| (n, l.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lines(s: &str) -> Vec<String> {
        s.lines().map(str::to_owned).collect()
    }

    #[test]
    fn file_source_inspector_reads_lines_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "import os\nx = 1\n").unwrap();
        let lines = FileSourceInspector.read_lines(file.path().to_str().unwrap()).unwrap();
        assert_eq!(lines, vec!["import os".to_string(), "x = 1".to_string()]);
    }

    #[test]
    fn file_source_inspector_reports_missing_file() {
        let result = FileSourceInspector.read_lines("/no/such/file.py");
        assert!(result.is_err());
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let src = lines("\n# header comment\n\nimport os\n");
        assert_eq!(first_executable_line(&src), Some(4));
    }

    #[test]
    fn skips_single_line_docstring() {
        let src = lines("\"\"\"module docstring.\"\"\"\nimport os\n");
        assert_eq!(first_executable_line(&src), Some(1));
    }

    #[test]
    fn skips_multi_line_docstring_returning_its_closing_line() {
        let src = lines("\"\"\"\nmulti\nline\ndocstring.\n\"\"\"\nimport os\n");
        assert_eq!(first_executable_line(&src), Some(5));
    }

    #[test]
    fn empty_file_has_no_executable_line() {
        assert_eq!(first_executable_line(&lines("\n\n# only comments\n")), None);
    }

    #[test]
    fn list_window_clips_to_file_bounds() {
        let src: Vec<String> = (1..=5).map(|n| format!("line {n}")).collect();
        let window = list_window(&src, 1, 7);
        assert_eq!(window.first().unwrap().0, 1);
        assert_eq!(window.last().unwrap().0, 5);
    }

    #[test]
    fn list_window_uses_absolute_line_numbers() {
        let src: Vec<String> = (1..=20).map(|n| format!("line {n}")).collect();
        let window = list_window(&src, 10, 2);
        assert_eq!(window, vec![
            (8, "line 8".to_string()),
            (9, "line 9".to_string()),
            (10, "line 10".to_string()),
            (11, "line 11".to_string()),
            (12, "line 12".to_string()),
        ]);
    }
}
