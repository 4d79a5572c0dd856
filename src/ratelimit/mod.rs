//! Rate limiting logic and state management.

mod account;
mod bucket;
mod store;

pub use account::BucketAccount;
pub use bucket::{Limit, TokenBucket};
pub use store::BucketStore;
