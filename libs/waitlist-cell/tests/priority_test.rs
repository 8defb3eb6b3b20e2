use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mockall::mock;
use uuid::Uuid;

use availability_cell::models::ProviderSchedule;
use booking_cell::models::{Appointment, AppointmentStatus, StatusMeta};
use booking_cell::store::memory::MemorySchedulingStore;
use booking_cell::store::BookingStore;
use shared_config::SchedulingConfig;
use shared_models::{
    AppointmentTypeInfo, ClinicalRiskScorer, SchedulingError, StaticTypeDirectory,
};
use waitlist_cell::models::{WaitlistEntry, WaitlistStatus};
use waitlist_cell::services::priority::PriorityEngine;

// ==============================================================================
// TEST FIXTURES AND UTILITIES
// ==============================================================================

mock! {
    pub Scorer {}

    #[async_trait]
    impl ClinicalRiskScorer for Scorer {
        async fn score(&self, subject_id: Uuid, type_id: Uuid) -> Result<i64, SchedulingError>;
    }
}

fn entry_created_days_ago(type_id: Uuid, days: i64) -> WaitlistEntry {
    let created_at = Utc::now() - Duration::days(days);
    WaitlistEntry {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        type_id,
        preferred_provider_id: None,
        earliest_start: created_at,
        latest_start: None,
        priority: 1,
        priority_factors: vec![],
        status: WaitlistStatus::Active,
        declines: 0,
        expiries: 0,
        created_at,
        updated_at: created_at,
    }
}

struct TestSetup {
    engine: PriorityEngine,
    store: Arc<MemorySchedulingStore>,
    routine_type: Uuid,
    preauth_type: Uuid,
}

impl TestSetup {
    fn with_clinical_score(clinical: i64) -> Self {
        let mut scorer = MockScorer::new();
        scorer.expect_score().returning(move |_, _| Ok(clinical));

        let routine_type = Uuid::new_v4();
        let preauth_type = Uuid::new_v4();
        let types = StaticTypeDirectory::new(vec![
            AppointmentTypeInfo::individual(routine_type, "follow-up", 30, false),
            AppointmentTypeInfo::individual(preauth_type, "urgent-consult", 30, true),
        ]);

        let store = MemorySchedulingStore::new();
        let engine = PriorityEngine::new(
            Arc::new(scorer),
            types,
            store.clone(),
            SchedulingConfig::default(),
        );

        Self {
            engine,
            store,
            routine_type,
            preauth_type,
        }
    }
}

// ==============================================================================
// TESTS
// ==============================================================================

#[tokio::test]
async fn score_sums_components_and_keeps_the_breakdown() {
    let setup = TestSetup::with_clinical_score(40);
    let entry = entry_created_days_ago(setup.preauth_type, 10);

    let score = setup
        .engine
        .compute_priority(&entry, Utc::now())
        .await
        .unwrap();

    // clinical 40 + wait 10 days * 2 + pre-auth 30
    assert_eq!(score.score, 90);
    let factor = |name: &str| {
        score
            .factors
            .iter()
            .find(|f| f.factor == name)
            .map(|f| f.points)
    };
    assert_eq!(factor("clinical"), Some(40));
    assert_eq!(factor("wait_time"), Some(20));
    assert_eq!(factor("type_urgency"), Some(30));
    assert_eq!(factor("cancellation_history"), None);
}

#[tokio::test]
async fn wait_time_score_is_capped() {
    let setup = TestSetup::with_clinical_score(0);
    let entry = entry_created_days_ago(setup.routine_type, 200);

    let score = setup
        .engine
        .compute_priority(&entry, Utc::now())
        .await
        .unwrap();

    assert_eq!(score.score, 50);
}

#[tokio::test]
async fn clinical_score_is_capped() {
    let setup = TestSetup::with_clinical_score(2_500);
    let entry = entry_created_days_ago(setup.routine_type, 0);

    let score = setup
        .engine
        .compute_priority(&entry, Utc::now())
        .await
        .unwrap();

    assert_eq!(score.score, 100);
}

#[tokio::test]
async fn increasing_wait_never_decreases_the_score() {
    let setup = TestSetup::with_clinical_score(25);
    let entry = entry_created_days_ago(setup.routine_type, 0);

    let mut previous = 0;
    for days in 0..120 {
        let as_of = entry.created_at + Duration::days(days);
        let score = setup.engine.compute_priority(&entry, as_of).await.unwrap();
        assert!(
            score.score >= previous,
            "score dropped from {} to {} at day {}",
            previous,
            score.score,
            days
        );
        previous = score.score;
    }
}

#[tokio::test]
async fn score_is_floored_at_one() {
    let setup = TestSetup::with_clinical_score(0);
    let mut entry = entry_created_days_ago(setup.routine_type, 0);
    entry.declines = 10;

    let score = setup
        .engine
        .compute_priority(&entry, entry.created_at)
        .await
        .unwrap();

    assert_eq!(score.score, 1);
}

#[tokio::test]
async fn declined_offers_lower_the_score_without_zeroing_it() {
    let setup = TestSetup::with_clinical_score(30);
    let mut entry = entry_created_days_ago(setup.routine_type, 0);

    let baseline = setup
        .engine
        .compute_priority(&entry, entry.created_at)
        .await
        .unwrap();

    entry.declines = 2;
    let adjusted = setup
        .engine
        .compute_priority(&entry, entry.created_at)
        .await
        .unwrap();

    assert_eq!(baseline.score - adjusted.score, 10);
    assert!(adjusted.score >= 1);
}

#[tokio::test]
async fn recent_cancellations_penalize_the_subject() {
    let setup = TestSetup::with_clinical_score(50);
    let entry = entry_created_days_ago(setup.routine_type, 0);

    // Give the subject two recent self-cancelled bookings.
    let provider_id = Uuid::new_v4();
    setup
        .store
        .upsert_provider_schedule(ProviderSchedule {
            provider_id,
            windows: vec![],
            time_off: vec![],
        })
        .await;
    for offset in [10, 20] {
        let now = Utc::now();
        let start = now + Duration::days(offset);
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: entry.patient_id,
            provider_id,
            type_id: setup.routine_type,
            start,
            end: start + Duration::minutes(30),
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
        let inserted = setup.store.insert_if_free(appointment, None).await.unwrap();
        setup
            .store
            .update_booking_status(
                inserted.id,
                AppointmentStatus::Cancelled,
                StatusMeta {
                    reason: Some("changed plans".to_string()),
                    actor: Some(entry.patient_id),
                    linked_appointment: None,
                    at: Some(now),
                },
            )
            .await
            .unwrap();
    }

    let score = setup
        .engine
        .compute_priority(&entry, Utc::now())
        .await
        .unwrap();

    // clinical 50 - 2 * 10 cancellation penalty
    assert_eq!(score.score, 30);
    assert!(score
        .factors
        .iter()
        .any(|f| f.factor == "cancellation_history" && f.points == -20));
}
