pub mod models;
pub mod services;
pub mod store;

pub use models::{
    GroupSeries, GroupSession, HolidayPolicy, NewSeries, ParticipantStatus, SeriesParticipant,
    SeriesStatus, SessionStatus,
};
pub use services::enrollment::EnrollmentService;
pub use services::generator::SeriesGenerator;
pub use store::memory::MemorySeriesStore;
pub use store::SeriesStore;
