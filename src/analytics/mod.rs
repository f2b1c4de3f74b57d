pub mod metrics;
pub mod outcome;
pub mod report;
pub mod winrate;

pub use report::{Report, ReportOptions};
