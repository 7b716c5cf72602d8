//! Idempotent output gate for stage outputs.

use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputGate {
    /// Produce and write the output
    Write,
    /// Produce the output but leave the filesystem untouched
    DryRun,
    /// Output already exists and overwrite was not requested
    SkipExisting,
}

pub fn output_gate(path: &Path, overwrite: bool, dry_run: bool) -> OutputGate {
    if dry_run {
        return OutputGate::DryRun;
    }
    if path.exists() && !overwrite {
        warn!(
            "Output exists: {} (use --overwrite to replace)",
            path.display()
        );
        return OutputGate::SkipExisting;
    }
    OutputGate::Write
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_gate() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("matches.csv");
        std::fs::write(&existing, "x").unwrap();
        let fresh = dir.path().join("new.csv");

        assert_eq!(output_gate(&fresh, false, false), OutputGate::Write);
        assert_eq!(output_gate(&existing, false, false), OutputGate::SkipExisting);
        assert_eq!(output_gate(&existing, true, false), OutputGate::Write);
        assert_eq!(output_gate(&existing, false, true), OutputGate::DryRun);
        assert_eq!(output_gate(&fresh, true, true), OutputGate::DryRun);
    }
}
