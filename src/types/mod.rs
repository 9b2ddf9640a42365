pub mod pair;
pub mod rate;
pub mod timestamp;

pub use pair::Pair;
pub use rate::{RateRecord, StorageKey};
pub use timestamp::Timestamp;
