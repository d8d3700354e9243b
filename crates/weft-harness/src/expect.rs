#![forbid(unsafe_code)]

//! Expected-error ledger.
//!
//! Tests declare which error messages they expect and how many times, then
//! check the ledger against the runtime's [`ErrorSink`]. Counts are exact;
//! order is never checked.

use std::fmt;

use thiserror::Error;
use weft_runtime::{ErrorSink, ReportedError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMismatch {
    pub message: String,
    pub expected: usize,
    pub observed: usize,
}

impl fmt::Display for CountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} x {:?}, observed {}",
            self.expected, self.message, self.observed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error expectations not met: {}", .mismatches.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ErrorMismatch {
    pub mismatches: Vec<CountMismatch>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpectedErrors {
    expected: Vec<(String, usize)>,
}

impl ExpectedErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `message` one more time.
    #[must_use]
    pub fn expect(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        match self.expected.iter_mut().find(|(m, _)| *m == message) {
            Some((_, n)) => *n += 1,
            None => self.expected.push((message, 1)),
        }
        self
    }

    /// Expect `message` exactly `times` times in total.
    #[must_use]
    pub fn expect_times(mut self, message: impl Into<String>, times: usize) -> Self {
        let message = message.into();
        self.expected.retain(|(m, _)| *m != message);
        self.expected.push((message, times));
        self
    }

    /// Check every expected count against `sink`.
    ///
    /// # Errors
    ///
    /// Lists every message whose observed count differs.
    pub fn verify(&self, sink: &ErrorSink) -> Result<(), ErrorMismatch> {
        let mismatches: Vec<CountMismatch> = self
            .expected
            .iter()
            .filter_map(|(message, expected)| {
                let observed = sink.count(message);
                (observed != *expected).then(|| CountMismatch {
                    message: message.clone(),
                    expected: *expected,
                    observed,
                })
            })
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(ErrorMismatch { mismatches })
        }
    }

    /// Recorded errors whose message was never declared.
    #[must_use]
    pub fn unexpected<'a>(&self, sink: &'a ErrorSink) -> Vec<&'a ReportedError> {
        sink.entries()
            .iter()
            .filter(|e| !self.expected.iter().any(|(m, _)| *m == e.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_runtime::ActionId;

    #[test]
    fn exact_counts_are_enforced() {
        let mut sink = ErrorSink::new();
        sink.record(Some(ActionId(1)), &"boom");
        sink.record(Some(ActionId(1)), &"boom");
        sink.record(None, &"stray");

        let ledger = ExpectedErrors::new().expect("boom").expect("boom");
        assert!(ledger.verify(&sink).is_ok());
        assert_eq!(ledger.unexpected(&sink).len(), 1);

        let err = ExpectedErrors::new().expect_times("boom", 3).verify(&sink).unwrap_err();
        assert_eq!(err.mismatches[0].observed, 2);
        assert!(err.to_string().contains("expected 3"));
    }
}
