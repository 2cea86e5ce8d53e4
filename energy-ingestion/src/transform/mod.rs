mod classify;
mod normalize;

pub use classify::classify;
pub use normalize::{
    normalize, NormalizedReading, RawRecord, RejectionReason, ENERGY_CONSUMED_KWH,
    ENERGY_GENERATED_KWH, NET_ENERGY_KWH, SITE_ID, TIMESTAMP,
};
