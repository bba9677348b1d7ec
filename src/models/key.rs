use std::fmt::{Display, Formatter};

use crate::prelude::*;

/// Hour of the day the reading bucket starts at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hour(u8);

impl Hour {
    pub const N_HOURS: usize = 24;

    pub fn all() -> impl Iterator<Item = Self> {
        (0..Self::N_HOURS as u8).map(Self)
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u32> for Hour {
    type Error = anyhow::Error;

    fn try_from(hour: u32) -> Result<Self> {
        match u8::try_from(hour) {
            Ok(hour) if (hour as usize) < Self::N_HOURS => Ok(Self(hour)),
            _ => Err(anyhow!("{} is not an hour of the day", hour)),
        }
    }
}

impl From<Hour> for u32 {
    fn from(hour: Hour) -> Self {
        hour.0 as u32
    }
}

impl Display for Hour {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{:02}h", self.0)
    }
}

/// Identifies one rolling history: a station, a pollutant and an hour of the day.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub station: String,
    pub pollutant: String,
    pub hour: Hour,
}

impl Key {
    pub fn new(station: impl Into<String>, pollutant: impl Into<String>, hour: Hour) -> Self {
        Self {
            station: station.into(),
            pollutant: pollutant.into(),
            hour,
        }
    }
}

impl Display for Key {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}/{}", self.station, self.pollutant, self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_range_ok() {
        assert!(Hour::try_from(0_u32).is_ok());
        assert!(Hour::try_from(23_u32).is_ok());
        assert!(Hour::try_from(24_u32).is_err());
        assert!(Hour::try_from(300_u32).is_err());
        assert_eq!(Hour::all().count(), 24);
    }

    #[test]
    fn display_key_ok() -> Result {
        let key = Key::new("FR04143", "O3", Hour::try_from(7_u32)?);
        assert_eq!(key.to_string(), "FR04143/O3/07h");
        Ok(())
    }
}
