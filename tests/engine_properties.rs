mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aviation_training_backend::db::models::{
    AssessmentInput, AssessmentResult, CertificateStatus, SessionStatus,
};
use aviation_training_backend::engine::{
    EngineError, InMemoryStore, IssuanceOutcome, IssuanceReport, RowOutcome,
};
use aviation_training_backend::retry::RetryPolicy;
use common::{InterleavedStore, TestContext};
use time::macros::datetime;
use uuid::Uuid;

fn pass(participant_id: Uuid, score: f64) -> AssessmentInput {
    AssessmentInput {
        participant_id,
        score: Some(score),
        result: Some(AssessmentResult::Pass),
        remarks: None,
    }
}

async fn status_of(ctx: &TestContext, certificate_id: Uuid) -> CertificateStatus {
    ctx.engine
        .certificates
        .get_certificate(certificate_id)
        .await
        .unwrap()
        .status
}

#[tokio::test]
async fn test_repeated_issuance_never_duplicates() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let trainees = [ctx.trainee().await, ctx.trainee().await];
    for trainee in trainees {
        ctx.enroll(session.id, trainee).await;
        ctx.grade(session.id, trainee, Some(90.0), AssessmentResult::Pass)
            .await;
    }
    ctx.complete(session.id).await;

    let issuer = &ctx.engine.certificates;
    let (first, second) = tokio::join!(
        issuer.issue_certificates(session.id, &ctx.admin),
        issuer.issue_certificates(session.id, &ctx.instructor),
    );
    let issued = first.unwrap().value.recipients().len() + second.unwrap().value.recipients().len();
    assert_eq!(issued, 2);

    let third = issuer
        .issue_certificates(session.id, &ctx.admin)
        .await
        .unwrap()
        .into_value();
    assert!(third.recipients().is_empty());
    assert_eq!(issuer.list_for_session(session.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_certificate_status_follows_the_clock() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let trainee = ctx.trainee().await;
    ctx.enroll(session.id, trainee).await;
    ctx.grade(session.id, trainee, None, AssessmentResult::Pass).await;
    ctx.complete(session.id).await;

    let certificate = ctx
        .engine
        .certificates
        .issue_for_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap()
        .into_value();

    assert_eq!(status_of(&ctx, certificate.id).await, CertificateStatus::Valid);

    // Expires 2027-06-02; the default window is three months.
    ctx.clock.set(datetime!(2027-03-01 09:00 UTC));
    assert_eq!(status_of(&ctx, certificate.id).await, CertificateStatus::Valid);

    ctx.clock.set(datetime!(2027-03-03 09:00 UTC));
    assert_eq!(status_of(&ctx, certificate.id).await, CertificateStatus::Expiring);

    ctx.clock.set(datetime!(2027-06-02 09:00 UTC));
    assert_eq!(status_of(&ctx, certificate.id).await, CertificateStatus::Expiring);

    ctx.clock.set(datetime!(2027-06-03 09:00 UTC));
    assert_eq!(status_of(&ctx, certificate.id).await, CertificateStatus::Expired);
}

#[tokio::test]
async fn test_no_certificate_without_a_pass() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let trainee = ctx.trainee().await;
    ctx.enroll(session.id, trainee).await;
    ctx.grade(session.id, trainee, Some(99.0), AssessmentResult::Pending)
        .await;
    ctx.complete(session.id).await;

    let err = ctx
        .engine
        .certificates
        .issue_for_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotEligible { .. }));
    assert!(ctx
        .engine
        .certificates
        .list_for_participant(trainee)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_atomic_batch_rolls_back_on_bad_row() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let enrolled = ctx.trainee().await;
    let stranger = ctx.trainee().await;
    ctx.enroll(session.id, enrolled).await;

    let report = ctx
        .engine
        .assessments
        .bulk_record(
            session.id,
            vec![pass(enrolled, 80.0), pass(stranger, 75.0)],
            &ctx.instructor,
        )
        .await
        .unwrap()
        .into_value();

    assert!(report.atomic);
    assert_eq!(report.recorded_count(), 0);
    assert_eq!(report.rows[0].outcome, RowOutcome::RolledBack);
    assert!(matches!(
        report.rows[1].outcome,
        RowOutcome::Rejected(EngineError::ReferentialViolation { .. })
    ));
    assert_eq!(ctx.store.assessment_count(session.id).await, 0);
}

#[tokio::test]
async fn test_independent_batch_keeps_good_rows() {
    let ctx = TestContext::with_store(InMemoryStore::without_atomic_batches()).await;
    let session = ctx.planned_session().await;
    let enrolled = ctx.trainee().await;
    let stranger = ctx.trainee().await;
    ctx.enroll(session.id, enrolled).await;

    let report = ctx
        .engine
        .assessments
        .bulk_record(
            session.id,
            vec![pass(enrolled, 80.0), pass(stranger, 75.0)],
            &ctx.instructor,
        )
        .await
        .unwrap()
        .into_value();

    assert!(!report.atomic);
    assert_eq!(report.recorded_count(), 1);
    assert_eq!(ctx.store.assessment_count(session.id).await, 1);
}

#[tokio::test]
async fn test_unavailable_store_fails_without_partial_writes() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let trainee = ctx.trainee().await;

    ctx.store.set_unavailable(true);
    let err = ctx
        .engine
        .roster
        .enroll_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    ctx.store.set_unavailable(false);
    assert_eq!(ctx.store.participant_count(session.id).await, 0);
    ctx.enroll(session.id, trainee).await;
    assert_eq!(ctx.store.participant_count(session.id).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_once_store_returns() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let policy = RetryPolicy::new(4, Duration::from_millis(50));

    ctx.store.set_unavailable(true);
    let calls = &AtomicU32::new(0);
    let ctx_ref = &ctx;
    let session_id = session.id;
    let fetched = policy
        .run("get_session", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                ctx_ref.store.set_unavailable(false);
            }
            ctx_ref.engine.lifecycle.get_session(session_id).await
        })
        .await
        .unwrap();

    assert_eq!(fetched.id, session.id);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_compliance_counts_organization_certificates() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let certified = ctx.trainee().await;
    let outsider = Uuid::new_v4();
    ctx.store.add_user(outsider, Some(Uuid::new_v4())).await;
    for trainee in [certified, outsider] {
        ctx.enroll(session.id, trainee).await;
        ctx.grade(session.id, trainee, Some(88.0), AssessmentResult::Pass)
            .await;
    }
    ctx.complete(session.id).await;
    ctx.engine
        .certificates
        .issue_certificates(session.id, &ctx.admin)
        .await
        .unwrap();

    let report = ctx
        .engine
        .compliance
        .aggregate_for_organization(ctx.organization_id)
        .await
        .unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.valid, 1);
    assert_eq!(report.compliance_rate(), Some(1.0));

    ctx.clock.set(datetime!(2027-07-01 09:00 UTC));
    let later = ctx
        .engine
        .compliance
        .aggregate_for_organization(ctx.organization_id)
        .await
        .unwrap();
    assert_eq!(later.expired, 1);
    assert_eq!(later.expired_certificates[0].participant_id, certified);
    assert_eq!(later.compliance_rate(), Some(0.0));
}

#[tokio::test]
async fn test_cancelled_session_closes_roster() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    ctx.move_to(session.id, SessionStatus::Cancelled).await;

    let trainee = ctx.trainee().await;
    let err = ctx
        .engine
        .roster
        .enroll_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionClosed { .. }));
}

/// A completed session with one passing trainee, where issuance reads
/// assessments 20ms before it acts on them.
async fn slow_issuance_fixture() -> (TestContext, Arc<InterleavedStore>, Uuid, Uuid) {
    let store = Arc::new(InterleavedStore::new(InMemoryStore::new()));
    let ctx = TestContext::over(store.clone()).await;
    let session = ctx.planned_session().await;
    let trainee = ctx.trainee().await;
    ctx.enroll(session.id, trainee).await;
    ctx.grade(session.id, trainee, Some(91.0), AssessmentResult::Pass)
        .await;
    ctx.complete(session.id).await;
    store.hold_assessment_listings(Duration::from_millis(20));
    (ctx, store, session.id, trainee)
}

fn outcome_for(report: &IssuanceReport, participant_id: Uuid) -> Option<IssuanceOutcome> {
    report
        .outcomes
        .iter()
        .find(|o| o.participant_id == participant_id)
        .map(|o| o.outcome.clone())
}

#[tokio::test(start_paused = true)]
async fn test_removal_during_issuance_leaves_no_certificate() {
    let (ctx, _store, session_id, trainee) = slow_issuance_fixture().await;

    let (issued, removed) = tokio::join!(
        ctx.engine.certificates.issue_certificates(session_id, &ctx.admin),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.engine
                .roster
                .remove_participant(session_id, trainee, &ctx.admin)
                .await
        },
    );

    removed.unwrap();
    let report = issued.unwrap().into_value();
    assert!(report.recipients().is_empty());
    assert_eq!(
        outcome_for(&report, trainee),
        Some(IssuanceOutcome::NotEligible { result: None })
    );
    assert_eq!(ctx.store.participant_count(session_id).await, 0);
    assert!(ctx
        .engine
        .certificates
        .list_for_participant(trainee)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_regrade_during_issuance_leaves_no_certificate() {
    let (ctx, _store, session_id, trainee) = slow_issuance_fixture().await;

    let (issued, ()) = tokio::join!(
        ctx.engine.certificates.issue_certificates(session_id, &ctx.admin),
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.grade(session_id, trainee, Some(35.0), AssessmentResult::Fail)
                .await;
        },
    );

    let report = issued.unwrap().into_value();
    assert!(report.recipients().is_empty());
    assert_eq!(
        outcome_for(&report, trainee),
        Some(IssuanceOutcome::NotEligible {
            result: Some(AssessmentResult::Fail)
        })
    );
    assert!(ctx
        .engine
        .certificates
        .list_for_session(session_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_certified_participant_stays_passed_until_revoked() {
    let ctx = TestContext::new().await;
    let session = ctx.planned_session().await;
    let trainee = ctx.trainee().await;
    ctx.enroll(session.id, trainee).await;
    ctx.grade(session.id, trainee, Some(82.0), AssessmentResult::Pass)
        .await;
    ctx.complete(session.id).await;
    let certificate = ctx
        .engine
        .certificates
        .issue_for_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap()
        .into_value();

    let fail = AssessmentInput {
        participant_id: trainee,
        score: Some(10.0),
        result: Some(AssessmentResult::Fail),
        remarks: None,
    };
    let err = ctx
        .engine
        .assessments
        .record_assessment(session.id, fail.clone(), &ctx.instructor)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ParticipantCertified { .. }));
    let err = ctx
        .engine
        .roster
        .remove_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ParticipantCertified { .. }));

    ctx.engine
        .certificates
        .revoke_certificate(certificate.id, "assessment under review", &ctx.admin)
        .await
        .unwrap();
    ctx.engine
        .assessments
        .record_assessment(session.id, fail, &ctx.instructor)
        .await
        .unwrap();
    ctx.engine
        .roster
        .remove_participant(session.id, trainee, &ctx.admin)
        .await
        .unwrap();
    assert_eq!(ctx.store.participant_count(session.id).await, 0);
}

#[tokio::test]
async fn test_transition_reports_contention_when_swaps_keep_losing() {
    let store = Arc::new(InterleavedStore::new(InMemoryStore::new()));
    let ctx = TestContext::over(store.clone()).await;
    let session = ctx.planned_session().await;

    store.lose_status_swaps(3);
    let err = ctx
        .engine
        .lifecycle
        .transition(session.id, SessionStatus::Active, &ctx.admin)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::TransitionContended {
            session_id: session.id,
            attempts: 3,
        }
    );
    assert!(err.is_retryable());
    let stored = ctx.engine.lifecycle.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Planned);

    store.lose_status_swaps(2);
    let moved = ctx
        .engine
        .lifecycle
        .transition(session.id, SessionStatus::Active, &ctx.admin)
        .await
        .unwrap()
        .into_value();
    assert_eq!(moved.to, SessionStatus::Active);
}
