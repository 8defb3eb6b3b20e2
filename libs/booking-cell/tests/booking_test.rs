use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use availability_cell::models::{AvailabilityWindow, ProviderSchedule};
use booking_cell::models::{Appointment, AppointmentStatus, ScheduleRequest};
use booking_cell::services::booking::{BookingService, FreedSlotObserver};
use booking_cell::store::memory::MemorySchedulingStore;
use booking_cell::store::BookingStore;
use shared_config::SchedulingConfig;
use shared_models::{
    AppointmentTypeInfo, CancellationAuthorizer, NoPrivileges, SchedulingError,
    StaticTypeDirectory, TracingAuditSink,
};

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

struct AllPrivileged;

#[async_trait]
impl CancellationAuthorizer for AllPrivileged {
    async fn is_privileged(&self, _actor_id: Uuid) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingObserver {
    freed: Mutex<Vec<(Uuid, DateTime<Utc>, DateTime<Utc>)>>,
}

#[async_trait]
impl FreedSlotObserver for RecordingObserver {
    async fn slot_freed(&self, provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.freed.lock().await.push((provider_id, start, end));
    }
}

struct TestSetup {
    store: Arc<MemorySchedulingStore>,
    service: Arc<BookingService>,
    provider_id: Uuid,
    type_id: Uuid,
    /// A working day ~30 days out, with a 09:00-17:00 window.
    day: NaiveDate,
}

impl TestSetup {
    async fn new() -> Self {
        Self::with_authorizer(NoPrivileges::new()).await
    }

    async fn with_authorizer(authorizer: Arc<dyn CancellationAuthorizer>) -> Self {
        let store = MemorySchedulingStore::new();
        let provider_id = Uuid::new_v4();
        let type_id = Uuid::new_v4();

        let day = (Utc::now() + Duration::days(30)).date_naive();
        store
            .upsert_provider_schedule(ProviderSchedule {
                provider_id,
                windows: vec![AvailabilityWindow {
                    id: Uuid::new_v4(),
                    day_of_week: day.weekday(),
                    start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                    effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    effective_until: None,
                }],
                time_off: vec![],
            })
            .await;

        let types = StaticTypeDirectory::new(vec![AppointmentTypeInfo::individual(
            type_id,
            "consultation",
            60,
            false,
        )]);

        let service = Arc::new(BookingService::new(
            store.clone(),
            store.clone(),
            types,
            authorizer,
            TracingAuditSink::new(),
            SchedulingConfig::default(),
        ));

        Self {
            store,
            service,
            provider_id,
            type_id,
            day,
        }
    }

    fn slot_at(&self, hour: u32) -> DateTime<Utc> {
        self.day
            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .and_utc()
    }

    fn request_at(&self, hour: u32) -> ScheduleRequest {
        ScheduleRequest {
            patient_id: Uuid::new_v4(),
            provider_id: self.provider_id,
            type_id: self.type_id,
            start: self.slot_at(hour),
            request_token: Some(Uuid::new_v4()),
        }
    }

    /// Insert a booking directly, bypassing slot validation. Used to set up
    /// near-term appointments for policy tests.
    async fn insert_raw(&self, start: DateTime<Utc>) -> Appointment {
        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            provider_id: self.provider_id,
            type_id: self.type_id,
            start,
            end: start + Duration::minutes(60),
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            rescheduled_from: None,
            rescheduled_to: None,
            request_token: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_if_free(appointment, None).await.unwrap()
    }
}

// ==============================================================================
// SCHEDULING
// ==============================================================================

#[tokio::test]
async fn schedule_creates_a_scheduled_booking() {
    let setup = TestSetup::new().await;

    let appointment = setup.service.schedule(setup.request_at(9)).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.start, setup.slot_at(9));
    assert_eq!(appointment.end, setup.slot_at(10));
}

#[tokio::test]
async fn schedule_outside_availability_is_unavailable() {
    let setup = TestSetup::new().await;

    let mut request = setup.request_at(9);
    request.start = setup
        .day
        .and_time(NaiveTime::from_hms_opt(18, 0, 0).unwrap())
        .and_utc();

    let result = setup.service.schedule(request).await;
    assert_matches!(result, Err(SchedulingError::SlotUnavailable));
}

#[tokio::test]
async fn schedule_for_unknown_provider_is_not_found() {
    let setup = TestSetup::new().await;

    let mut request = setup.request_at(9);
    request.provider_id = Uuid::new_v4();

    let result = setup.service.schedule(request).await;
    assert_matches!(result, Err(SchedulingError::NotFound(_)));
}

#[tokio::test]
async fn taken_slot_is_unavailable() {
    let setup = TestSetup::new().await;

    setup.service.schedule(setup.request_at(10)).await.unwrap();
    let result = setup.service.schedule(setup.request_at(10)).await;

    assert_matches!(result, Err(SchedulingError::SlotUnavailable));
}

#[tokio::test]
async fn replaying_a_request_token_returns_the_same_booking() {
    let setup = TestSetup::new().await;

    let request = setup.request_at(11);
    let first = setup.service.schedule(request.clone()).await.unwrap();
    let second = setup.service.schedule(request).await.unwrap();

    assert_eq!(first.id, second.id);
    let bookings = setup
        .store
        .list_bookings_in_range(setup.provider_id, setup.slot_at(9), setup.slot_at(17))
        .await
        .unwrap();
    assert_eq!(bookings.len(), 1);
}

#[tokio::test]
async fn concurrent_schedules_for_one_slot_admit_exactly_one() {
    let setup = TestSetup::new().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = setup.service.clone();
        let request = setup.request_at(13);
        handles.push(tokio::spawn(async move { service.schedule(request).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(SchedulingError::SlotUnavailable) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(successes, 1);

    let occupying: Vec<Appointment> = setup
        .store
        .list_bookings_in_range(setup.provider_id, setup.slot_at(13), setup.slot_at(14))
        .await
        .unwrap()
        .into_iter()
        .filter(Appointment::occupies_interval)
        .collect();
    assert_eq!(occupying.len(), 1);
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

#[tokio::test]
async fn short_notice_cancel_is_a_policy_violation() {
    let setup = TestSetup::new().await;
    let appointment = setup.insert_raw(Utc::now() + Duration::hours(2)).await;

    let result = setup
        .service
        .cancel(appointment.id, "cannot attend".to_string(), appointment.patient_id)
        .await;

    assert_matches!(result, Err(SchedulingError::PolicyViolation(_)));
}

#[tokio::test]
async fn privileged_actor_may_cancel_on_short_notice() {
    let setup = TestSetup::with_authorizer(Arc::new(AllPrivileged)).await;
    let appointment = setup.insert_raw(Utc::now() + Duration::hours(2)).await;

    let cancelled = setup
        .service
        .cancel(appointment.id, "provider emergency".to_string(), Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn cancel_records_metadata_and_frees_the_slot() {
    let setup = TestSetup::new().await;
    let observer = Arc::new(RecordingObserver::default());
    setup.service.set_freed_slot_observer(observer.clone()).await;

    let actor = Uuid::new_v4();
    let appointment = setup.service.schedule(setup.request_at(14)).await.unwrap();
    let cancelled = setup
        .service
        .cancel(appointment.id, "schedule change".to_string(), actor)
        .await
        .unwrap();

    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("schedule change"));
    assert_eq!(cancelled.cancelled_by, Some(actor));

    let freed = observer.freed.lock().await;
    assert_eq!(
        freed.as_slice(),
        &[(setup.provider_id, setup.slot_at(14), setup.slot_at(15))]
    );
    drop(freed);

    // The interval can be booked again.
    let rebooked = setup.service.schedule(setup.request_at(14)).await.unwrap();
    assert_eq!(rebooked.start, setup.slot_at(14));
}

#[tokio::test]
async fn completed_bookings_cannot_be_cancelled() {
    let setup = TestSetup::new().await;
    let actor = Uuid::new_v4();
    let appointment = setup.service.schedule(setup.request_at(9)).await.unwrap();

    setup.service.confirm(appointment.id, actor).await.unwrap();
    setup.service.check_in(appointment.id, actor).await.unwrap();
    setup.service.complete(appointment.id, actor).await.unwrap();

    let result = setup
        .service
        .cancel(appointment.id, "too late".to_string(), actor)
        .await;
    assert_matches!(result, Err(SchedulingError::InvalidState(_)));
}

// ==============================================================================
// RESCHEDULING
// ==============================================================================

#[tokio::test]
async fn reschedule_links_original_and_replacement() {
    let setup = TestSetup::new().await;
    let actor = Uuid::new_v4();
    let original = setup.service.schedule(setup.request_at(9)).await.unwrap();

    let replacement = setup
        .service
        .reschedule(original.id, setup.slot_at(11), actor)
        .await
        .unwrap();

    assert_eq!(replacement.status, AppointmentStatus::Scheduled);
    assert_eq!(replacement.rescheduled_from, Some(original.id));
    assert_eq!(replacement.start, setup.slot_at(11));

    let original = setup.service.get_appointment(original.id).await.unwrap();
    assert_eq!(original.status, AppointmentStatus::Rescheduled);
    assert_eq!(original.rescheduled_to, Some(replacement.id));
}

#[tokio::test]
async fn failed_reschedule_leaves_the_original_untouched() {
    let setup = TestSetup::new().await;
    let original = setup.service.schedule(setup.request_at(9)).await.unwrap();
    setup.service.schedule(setup.request_at(10)).await.unwrap();

    let result = setup
        .service
        .reschedule(original.id, setup.slot_at(10), Uuid::new_v4())
        .await;
    assert_matches!(result, Err(SchedulingError::SlotUnavailable));

    let original = setup.service.get_appointment(original.id).await.unwrap();
    assert_eq!(original.status, AppointmentStatus::Scheduled);
    assert!(original.rescheduled_to.is_none());
}

#[tokio::test]
async fn reschedule_may_keep_the_same_start() {
    // The vacated interval does not block its own replacement.
    let setup = TestSetup::new().await;
    let original = setup.service.schedule(setup.request_at(9)).await.unwrap();

    let replacement = setup
        .service
        .reschedule(original.id, setup.slot_at(9), Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(replacement.start, setup.slot_at(9));
    let original = setup.service.get_appointment(original.id).await.unwrap();
    assert_eq!(original.status, AppointmentStatus::Rescheduled);
}

// ==============================================================================
// STATE MACHINE
// ==============================================================================

#[tokio::test]
async fn visit_progresses_through_confirm_check_in_complete() {
    let setup = TestSetup::new().await;
    let actor = Uuid::new_v4();
    let appointment = setup.service.schedule(setup.request_at(15)).await.unwrap();

    let confirmed = setup.service.confirm(appointment.id, actor).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let checked_in = setup.service.check_in(appointment.id, actor).await.unwrap();
    assert_eq!(checked_in.status, AppointmentStatus::CheckedIn);

    let completed = setup.service.complete(appointment.id, actor).await.unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn scheduled_cannot_jump_to_completed() {
    let setup = TestSetup::new().await;
    let appointment = setup.service.schedule(setup.request_at(16)).await.unwrap();

    let result = setup.service.complete(appointment.id, Uuid::new_v4()).await;
    assert_matches!(result, Err(SchedulingError::InvalidState(_)));
}
