pub mod models;
pub mod services;
pub mod store;

pub use models::{
    EnrollRequest, OfferStatus, PriorityFactor, PriorityScore, SweepReport, WaitlistEntry,
    WaitlistOffer, WaitlistStatus,
};
pub use services::matcher::WaitlistMatcher;
pub use services::priority::PriorityEngine;
pub use store::memory::MemoryWaitlistStore;
pub use store::WaitlistStore;
