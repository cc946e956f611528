//! Printing outcomes as they stream in.

use std::collections::HashMap;
use std::io::{self, Write};

use colored::ColoredString;
use colourado::{ColorPalette, PaletteType};
use itertools::Itertools;
use tracing::{error, info};

use crate::host::prettify;
use crate::job::Outcome;

/// Prints each outcome's output with a colored host prefix on every line and
/// keeps track of which hosts failed.
pub struct Printer {
    labels: HashMap<String, ColoredString>,
    succeeded: usize,
    failed: Vec<String>,
}

impl Printer {
    /// One color per host, assigned from a pastel palette.
    pub fn new(hosts: &[String]) -> Self {
        let colors = ColorPalette::new(hosts.len().max(1) as u32, PaletteType::Pastel, false).colors;
        let labels = hosts
            .iter()
            .zip(colors.into_iter().cycle())
            .map(|(host, color)| (host.clone(), prettify(host, color)))
            .collect();
        Self {
            labels,
            succeeded: 0,
            failed: vec![],
        }
    }

    pub fn print(&mut self, outcome: &Outcome) -> io::Result<()> {
        let stdout = io::stdout();
        // Without the lock, output lines of different hosts get mixed.
        let mut guard = stdout.lock();
        self.write(&mut guard, outcome)
    }

    pub fn write<W: Write>(&mut self, out: &mut W, outcome: &Outcome) -> io::Result<()> {
        let label = self
            .labels
            .get(&outcome.host)
            .map(|label| label.to_string())
            .unwrap_or_else(|| format!("[{}]", outcome.host));
        write_prefixed(out, &label, &outcome.output)?;

        match &outcome.error {
            None => self.succeeded += 1,
            Some(e) => {
                error!(host = %outcome.host, error = %e, "command failed");
                self.failed.push(outcome.host.clone());
            }
        }
        Ok(())
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Logs the totals, and with `list_failed` every failed host.
    pub fn summarize(&self, list_failed: bool, expected: usize) {
        let done = self.succeeded + self.failed.len();
        info!(
            succeeded = self.succeeded,
            failed = self.failed.len(),
            pending = expected.saturating_sub(done),
            "run finished"
        );
        if list_failed && !self.failed.is_empty() {
            info!("failed hosts:\n{}", self.failed.iter().sorted().join("\n"));
        }
    }
}

/// Writes `output` line by line, each line prefixed with `label`. Invalid UTF-8
/// is replaced and a missing final newline is added.
fn write_prefixed<W: Write>(out: &mut W, label: &str, output: &[u8]) -> io::Result<()> {
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', output) {
        let line = &output[start..end];
        writeln!(out, "{} {}", label, String::from_utf8_lossy(strip_cr(line)))?;
        start = end + 1;
    }
    if start < output.len() {
        let line = &output[start..];
        writeln!(out, "{} {}", label, String::from_utf8_lossy(strip_cr(line)))?;
    }
    Ok(())
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}
