//! Date-partitioned archive discovery
//!
//! Stream files live under `<root>/<YYYY>/<Mon>/<DD>/<event>/<market file>`.
//! A file is in scope when the date encoded in its directory path falls
//! inside the caller's inclusive window.

use anyhow::{ensure, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

const MONTH_ABBREVS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Inclusive `[start, end]` date window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        ensure!(start <= end, "date window start {} is after end {}", start, end);
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
            .with_context(|| format!("invalid start date: {}", start))?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .with_context(|| format!("invalid end date: {}", end))?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Month segment: `Jan`..`Dec` (any case) or `1`..`12`
fn parse_month(segment: &str) -> Option<u32> {
    let lower = segment.to_ascii_lowercase();
    if let Some(idx) = MONTH_ABBREVS.iter().position(|m| *m == lower) {
        return Some(idx as u32 + 1);
    }
    segment.parse::<u32>().ok().filter(|m| (1..=12).contains(m))
}

fn parse_year(segment: &str) -> Option<i32> {
    if segment.len() == 4 && segment.chars().all(|c| c.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

fn parse_day(segment: &str) -> Option<u32> {
    if (1..=2).contains(&segment.len()) && segment.chars().all(|c| c.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

/// Date encoded in a file's directory segments.
///
/// Uses the deepest consecutive `year / month / day` triple so a root that
/// itself contains a year-like segment does not shadow the partition.
pub fn archive_date(path: &Path) -> Option<NaiveDate> {
    let dirs: Vec<&str> = path
        .parent()?
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    if dirs.len() < 3 {
        return None;
    }

    (0..=dirs.len() - 3).rev().find_map(|i| {
        let year = parse_year(dirs[i])?;
        let month = parse_month(dirs[i + 1])?;
        let day = parse_day(dirs[i + 2])?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// All regular, non-hidden files under `root`, sorted by path
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    ensure!(root.exists(), "input directory not found: {}", root.display());

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false);
            if hidden {
                continue;
            }
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Files under `root` whose archive date is inside `window`
pub fn files_in_window(root: &Path, window: &DateWindow) -> Result<Vec<PathBuf>> {
    let files = collect_files(root)?;
    let total = files.len();

    let selected: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| match archive_date(path) {
            Some(date) => window.contains(date),
            None => {
                debug!("No archive date in path, skipping: {}", path.display());
                false
            }
        })
        .collect();

    debug!(
        "Selected {} of {} archive files in window {}..={}",
        selected.len(),
        total,
        window.start,
        window.end
    );
    Ok(selected)
}
