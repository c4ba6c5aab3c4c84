//! Writing identifiers back into test source files.
//!
//! The reconciler only produces `(file, old name) -> new name` mappings;
//! a [`SourceRewriter`] applies them. [`RobotFileRewriter`] handles the
//! plain-text `*** Test Cases ***` format.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::codec;

/// Errors raised while reading or rewriting source files.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Test '{name}' not found in {path}")]
    TestNotFound { path: PathBuf, name: String },
}

impl RewriteError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RewriteError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One test rename inside a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub old_name: String,
    pub new_name: String,
}

/// Trait for source file mutation backends.
///
/// Renames are split in two steps so a caller touching several files can
/// resolve every rename before the first write.
pub trait SourceRewriter: Send + Sync {
    /// Resolves renames against one file and returns its new content.
    /// `None` means the file needs no write. Nothing is written here.
    fn prepare_renames(&self, file: &Path, renames: &[Rename]) -> Result<Option<String>, RewriteError>;

    /// Writes content produced by [`SourceRewriter::prepare_renames`].
    fn write_source(&self, file: &Path, content: &str) -> Result<(), RewriteError>;

    /// Renames tests in one file. Either every rename is applied or the
    /// file is left untouched.
    fn rename_tests(&self, file: &Path, renames: &[Rename]) -> Result<(), RewriteError> {
        match self.prepare_renames(file, renames)? {
            Some(content) => self.write_source(file, &content),
            None => Ok(()),
        }
    }

    /// Removes identifier tokens from every test name in the file.
    /// Returns the number of renamed tests.
    fn strip_ids(&self, file: &Path) -> Result<usize, RewriteError>;

    /// Source block of a test, if the file declares it.
    fn test_code(&self, file: &Path, name: &str) -> Result<Option<String>, RewriteError>;
}

/// Rewriter for plain-text Robot Framework suite files.
#[derive(Debug, Clone, Copy, Default)]
pub struct RobotFileRewriter;

impl RobotFileRewriter {
    pub fn new() -> Self {
        Self
    }

    fn read(path: &Path) -> Result<RobotFile, RewriteError> {
        let content = fs::read_to_string(path).map_err(|e| RewriteError::io(path, e))?;
        Ok(RobotFile::parse(&content))
    }

    fn write(path: &Path, content: &str) -> Result<(), RewriteError> {
        fs::write(path, content).map_err(|e| RewriteError::io(path, e))
    }
}

impl SourceRewriter for RobotFileRewriter {
    fn prepare_renames(&self, file: &Path, renames: &[Rename]) -> Result<Option<String>, RewriteError> {
        let renames: Vec<&Rename> = renames.iter().filter(|r| r.old_name != r.new_name).collect();
        if renames.is_empty() {
            return Ok(None);
        }

        let mut parsed = Self::read(file)?;
        let mut planned = Vec::with_capacity(renames.len());
        let mut taken = HashSet::new();
        for rename in &renames {
            let line = parsed
                .test_lines()
                .find(|idx| !taken.contains(idx) && parsed.test_name(*idx) == Some(rename.old_name.as_str()))
                .ok_or_else(|| RewriteError::TestNotFound {
                    path: file.to_path_buf(),
                    name: rename.old_name.clone(),
                })?;
            taken.insert(line);
            planned.push((line, rename.new_name.as_str()));
        }

        for (line, new_name) in planned {
            parsed.set_test_name(line, new_name);
        }
        debug!(file = %file.display(), renamed = renames.len(), "Planned test renames");
        Ok(Some(parsed.render()))
    }

    fn write_source(&self, file: &Path, content: &str) -> Result<(), RewriteError> {
        Self::write(file, content)?;
        debug!(file = %file.display(), "Rewrote test names");
        Ok(())
    }

    fn strip_ids(&self, file: &Path) -> Result<usize, RewriteError> {
        let mut parsed = Self::read(file)?;
        let mut stripped = 0;

        let lines: Vec<usize> = parsed.test_lines().collect();
        for line in lines {
            let Some(name) = parsed.test_name(line) else { continue };
            let clean = codec::strip(name);
            if clean != name {
                parsed.set_test_name(line, &clean);
                stripped += 1;
            }
        }

        if stripped > 0 {
            Self::write(file, &parsed.render())?;
            info!(file = %file.display(), stripped, "Removed test identifiers");
        }
        Ok(stripped)
    }

    fn test_code(&self, file: &Path, name: &str) -> Result<Option<String>, RewriteError> {
        let parsed = Self::read(file)?;
        Ok(parsed.test_block(name))
    }
}

/// Rewriter that reads sources but never writes them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRewriter;

impl SourceRewriter for DryRunRewriter {
    fn prepare_renames(&self, file: &Path, renames: &[Rename]) -> Result<Option<String>, RewriteError> {
        for rename in renames {
            info!(
                file = %file.display(),
                from = %rename.old_name,
                to = %rename.new_name,
                "Would rename test"
            );
        }
        Ok(None)
    }

    fn write_source(&self, file: &Path, _content: &str) -> Result<(), RewriteError> {
        info!(file = %file.display(), "Would rewrite file");
        Ok(())
    }

    fn strip_ids(&self, file: &Path) -> Result<usize, RewriteError> {
        info!(file = %file.display(), "Would remove test identifiers");
        Ok(0)
    }

    fn test_code(&self, file: &Path, name: &str) -> Result<Option<String>, RewriteError> {
        RobotFileRewriter.test_code(file, name)
    }
}

/// Line-level model of a Robot suite file. Line endings are kept as-is.
struct RobotFile {
    lines: Vec<String>,
    /// Whether each line sits inside a test case section.
    in_tests: Vec<bool>,
}

impl RobotFile {
    fn parse(content: &str) -> Self {
        let lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();
        let mut in_tests = Vec::with_capacity(lines.len());
        let mut section_is_tests = false;

        for line in &lines {
            if let Some(header) = section_header(line) {
                section_is_tests = header == "test cases" || header == "test case";
                in_tests.push(false);
            } else {
                in_tests.push(section_is_tests);
            }
        }

        Self { lines, in_tests }
    }

    fn render(&self) -> String {
        self.lines.concat()
    }

    /// Indices of lines that start a test case.
    fn test_lines(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.lines.len()).filter(|idx| self.test_name(*idx).is_some())
    }

    fn test_name(&self, idx: usize) -> Option<&str> {
        if !self.in_tests.get(idx).copied().unwrap_or(false) {
            return None;
        }
        let line = &self.lines[idx];
        if line.starts_with(|c: char| c.is_whitespace()) || line.starts_with('#') {
            return None;
        }
        let name = &line[..name_end(line)];
        (!name.is_empty()).then_some(name)
    }

    fn set_test_name(&mut self, idx: usize, new_name: &str) {
        let line = &self.lines[idx];
        let end = name_end(line);
        self.lines[idx] = format!("{}{}", new_name, &line[end..]);
    }

    fn test_block(&self, name: &str) -> Option<String> {
        let start = self.test_lines().find(|idx| self.test_name(*idx) == Some(name))?;
        let mut end = start + 1;
        while end < self.lines.len() && self.in_tests[end] && self.test_name(end).is_none() {
            end += 1;
        }
        while end > start + 1 && self.lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        Some(self.lines[start..end].concat())
    }
}

/// Normalized section name for a `*** Section ***` line.
fn section_header(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if !trimmed.starts_with('*') {
        return None;
    }
    Some(trimmed.trim_matches(|c: char| c == '*' || c.is_whitespace()).to_lowercase())
}

/// End of the name cell: the first tab, double space or pipe separator, or
/// the line ending.
fn name_end(line: &str) -> usize {
    let content_end = line.trim_end_matches(['\r', '\n']).len();
    let content = &line[..content_end];
    [content.find('\t'), content.find("  "), content.find(" | ")]
        .into_iter()
        .flatten()
        .min()
        .map(|idx| content[..idx].trim_end().len())
        .unwrap_or_else(|| content.trim_end().len())
}
