mod energy_reading;
mod timestamp;

pub use energy_reading::{EnergyReading, ReadingKey, TimeRange};
pub use timestamp::{format_timestamp, parse_timestamp};
