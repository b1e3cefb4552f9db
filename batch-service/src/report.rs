// Run Summary
// Final human-readable report of a batch run

use crate::execution::{ErrorSnapshot, RunTally};

use std::fmt;
use std::time::Duration;

/// Totals and anomaly breakdown printed at the end of every normal run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tally: RunTally,
    pub errors: ErrorSnapshot,
}

impl RunSummary {
    pub fn new(tally: RunTally, errors: ErrorSnapshot) -> Self {
        Self { tally, errors }
    }

    /// Terminal rendering, printed even when nothing failed
    pub fn to_terminal(&self) -> String {
        let tally = &self.tally;
        let mut out = String::new();

        out.push_str(&format!(
            "\nProcessing complete in {}.\n",
            format_duration(tally.duration)
        ));
        out.push_str(&"=".repeat(60));
        out.push('\n');

        push_count(&mut out, "Total jobs:", tally.total);
        push_count(&mut out, "Successful:", tally.succeeded);
        push_count(&mut out, "Numeric output errors:", tally.anomalies);
        push_count(&mut out, "Hard failures:", tally.hard_failures);
        if tally.persistence_failures > 0 {
            push_count(&mut out, "Unwritten outputs:", tally.persistence_failures);
        }

        out.push_str(&"-".repeat(60));
        out.push('\n');

        if self.errors.by_descriptor.is_empty() {
            out.push_str("  No numeric output errors\n");
        } else {
            out.push_str("  Numeric output errors by descriptor:\n");
            for (key, count) in &self.errors.by_descriptor {
                out.push_str(&format!("    {:<28} {}\n", key, count));
            }
        }

        out.push_str(&format!(
            "\n  {} jobs completed successfully, {} jobs failed.\n",
            tally.completed(),
            tally.failed()
        ));
        out
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_terminal())
    }
}

fn push_count(out: &mut String, label: &str, count: usize) {
    out.push_str(&format!("  {:<24}{}\n", label, count));
}

/// `H:MM:SS`, whole seconds
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
