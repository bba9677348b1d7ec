pub use self::day_kind::DayKind;
pub use self::history::{History, HistoryEntry, HistoryError, WINDOW_DAYS};
pub use self::key::{Hour, Key};
pub use self::reading::{RawReading, Reading};

#[cfg(test)]
pub use self::history::tests as testing;

mod day_kind;
mod history;
mod key;
mod reading;
