//! Package dump reader.
//!
//! A dump directory holds `*.json` / `*.jsonl` files with one package JSON
//! object per line. [`DumpReader`] yields packages lazily: files are listed
//! up front (sorted by name, not recursive) but each one is opened only when
//! reached, so memory use is independent of corpus size.
//!
//! ```rust,ignore
//! use nusearch_index::DumpReader;
//!
//! for package in DumpReader::open("./nuget-data")?.with_limit(Some(100)) {
//!     println!("{}", package?.id);
//! }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use nusearch_core::{Error, Result};

use crate::document::Package;

const EXTENSIONS: &[&str] = &["json", "jsonl"];

struct OpenFile {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: usize,
}

/// Lazy, forward-only reader over a dump directory.
pub struct DumpReader {
    pending: std::vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
    remaining: Option<usize>,
}

impl DumpReader {
    /// List the dump files under `dir`.
    ///
    /// # Errors
    ///
    /// `Io` if the directory cannot be read.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| Error::io_with_path(e, dir))? {
            let path = entry.map_err(|e| Error::io_with_path(e, dir))?.path();
            let is_dump = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if is_dump && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        log::info!("Found {} dump file(s) in {}", files.len(), dir.display());
        Ok(Self {
            pending: files.into_iter(),
            current: None,
            remaining: None,
        })
    }

    /// Stop after `limit` packages. `None` reads everything.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.remaining = limit;
        self
    }

    fn next_record(&mut self) -> Option<Result<Package>> {
        loop {
            if self.current.is_none() {
                let path = self.pending.next()?;
                log::debug!("Reading {}", path.display());
                match File::open(&path) {
                    Ok(file) => {
                        self.current = Some(OpenFile {
                            path,
                            lines: BufReader::new(file).lines(),
                            line: 0,
                        });
                    }
                    Err(e) => return Some(Err(Error::io_with_path(e, &path))),
                }
            }

            let file = self.current.as_mut()?;
            let Some(line) = file.lines.next() else {
                self.current = None;
                continue;
            };
            file.line += 1;
            let location = format!("{}:{}", file.path.display(), file.line);

            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::io_with_path(e, &file.path))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse(&line, &location));
        }
    }
}

fn parse(line: &str, location: &str) -> Result<Package> {
    let package: Package = serde_json::from_str(line)
        .map_err(|e| Error::malformed_source(location, e.to_string()))?;
    if package.id.trim().is_empty() {
        return Err(Error::malformed_source(location, "package has no id"));
    }
    Ok(package)
}

impl Iterator for DumpReader {
    type Item = Result<Package>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        let record = self.next_record()?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(record)
    }
}

// ============================================================================
// Tests
// ============================================================================
