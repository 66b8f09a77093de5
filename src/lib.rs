pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod logging;
pub mod models;
pub mod normalization;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod store;

pub mod util {
    pub mod env;
}

use chrono::{Local, NaiveDateTime, Timelike};

/// Local wall-clock time at second precision, the resolution the dataset stores.
pub fn now_local() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
