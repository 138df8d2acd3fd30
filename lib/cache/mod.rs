/// Time sources used to drive cache expiry.
pub mod clock;
/// Whole-cache expiring key/value store.
pub mod expirable;
/// Cache traits for read and write operations.
pub mod traits;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use expirable::ExpirableCache;
