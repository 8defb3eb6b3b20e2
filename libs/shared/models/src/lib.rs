pub mod collaborators;
pub mod error;
pub mod types;

pub use collaborators::{
    AuditEvent, AuditSink, CancellationAuthorizer, Channel, ClinicalRiskScorer,
    FixedHolidayCalendar, HolidayCalendar, NoPrivileges, NotificationSink, TracingAuditSink,
};
pub use error::SchedulingError;
pub use types::{AppointmentTypeDirectory, AppointmentTypeInfo, StaticTypeDirectory};
