//! File handling for uploaded consumption data.

pub mod tabular;
pub mod uploads;
