//! Listeners bridging host lifecycle callbacks to the import and report
//! paths. Both accept events in any order.

mod import;
mod report;

pub use import::ImportListener;
pub use report::{ReportListener, RunReport};

/// What the host should do with a test that is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDirective {
    Skip { reason: &'static str },
}
