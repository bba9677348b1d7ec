pub mod average;
pub mod backoff;
pub mod time;
pub mod tracing;
