pub mod models;
pub mod services;
pub mod store;

pub use models::{AvailabilityWindow, OpenSlot, ProviderSchedule, TimeOffException};
pub use services::slots::SlotCalculator;
pub use store::ScheduleReader;
