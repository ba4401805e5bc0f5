//! Sequential pass/fail ledger in test-anything-protocol form.
//!
//! The reporter owns its own counters and writes one `ok`/`not ok` line
//! per assertion with a 1-based ordinal. Designated gate points abort the
//! whole run with a `Bail out!` line when the cumulative failure count is
//! non-zero, so a broken foundation never cascades into downstream noise.
//!
//! The plan line is emitted by [`TapReporter::finish`] once the total is
//! known; TAP permits a trailing plan.

use std::io::Write;

use crate::error::{HarnessError, HarnessResult};

/// TAP stream writer with cumulative pass/fail accounting.
pub struct TapReporter<W: Write> {
    out: W,
    next: u32,
    failures: u32,
}

impl<W: Write> TapReporter<W> {
    /// Write the stream to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            next: 1,
            failures: 0,
        }
    }

    /// Record a passing assertion.
    pub fn pass(&mut self, message: &str) -> HarnessResult<()> {
        let id = self.take_id();
        writeln!(self.out, "ok {id} - {message}")?;
        Ok(())
    }

    /// Record a failing assertion.
    pub fn fail(&mut self, message: &str) -> HarnessResult<()> {
        let id = self.take_id();
        self.failures += 1;
        tracing::warn!(id, message, "assertion failed");
        writeln!(self.out, "not ok {id} - {message}")?;
        Ok(())
    }

    /// Record one assertion from a condition. Returns the condition so
    /// callers can branch on it.
    pub fn assert(&mut self, condition: bool, message: &str) -> HarnessResult<bool> {
        if condition {
            self.pass(message)?;
        } else {
            self.fail(message)?;
        }
        Ok(condition)
    }

    /// Record one assertion from a check result, appending the mismatch
    /// description on failure.
    pub fn assert_check<E: std::fmt::Display>(
        &mut self,
        check: Result<(), E>,
        message: &str,
    ) -> HarnessResult<bool> {
        match check {
            Ok(()) => {
                self.pass(message)?;
                Ok(true)
            }
            Err(detail) => {
                self.fail(&format!("{message}: {detail}"))?;
                Ok(false)
            }
        }
    }

    /// Write a diagnostic line.
    pub fn diag(&mut self, message: &str) -> HarnessResult<()> {
        writeln!(self.out, "# {message}")?;
        Ok(())
    }

    /// Gate point: abort the run when any failure has been recorded.
    ///
    /// Emits a `Bail out!` line and returns [`HarnessError::GateTripped`]
    /// so no assertion downstream of a broken foundation ever runs.
    pub fn gate(&mut self, name: &str) -> HarnessResult<()> {
        if self.failures == 0 {
            return Ok(());
        }
        writeln!(
            self.out,
            "Bail out! {} failure(s) at gate '{name}'",
            self.failures
        )?;
        Err(HarnessError::GateTripped {
            gate: name.to_string(),
            failures: self.failures,
        })
    }

    /// Write the trailing plan line covering every recorded assertion.
    pub fn finish(&mut self) -> HarnessResult<()> {
        let total = self.next - 1;
        writeln!(self.out, "1..{total}")?;
        Ok(())
    }

    /// Cumulative failure count.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of assertions recorded so far.
    pub fn assertions(&self) -> u32 {
        self.next - 1
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}
