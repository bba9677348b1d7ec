pub use std::result::Result as StdResult;
pub use std::sync::Arc;
pub use std::time::Duration as StdDuration;
pub use std::time::Instant;

pub use anyhow::{anyhow, bail, Context};
pub use async_trait::async_trait;
pub use chrono::{Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
pub use tracing::{debug, error, info, instrument, trace, warn};

#[allow(dead_code)]
pub type AHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

#[allow(dead_code)]
pub type AHashSet<T> = std::collections::HashSet<T, ahash::RandomState>;

pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
