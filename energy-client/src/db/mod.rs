mod energy_queries;

pub use energy_queries::{anomalies_for_site, readings_for_site};
