//! Certificate eligibility and issuance.
//!
//! Certificates are issued only from completed sessions, only to enrolled
//! participants whose assessment result is `pass`, and at most once per
//! (session, participant) while unrevoked. Status is derived at read time
//! from the expiry date and never stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use time::Date;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::models::{
    AssessmentResult, Certificate, CertificateStatus, NewCertificate, SessionStatus,
    TrainingSession, TrainingStandard,
};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::{add_months, Clock};
use super::error::{EngineError, EngineResult};
use super::store::{CertificateInsert, EntityStore};

pub const DEFAULT_EXPIRING_WINDOW_MONTHS: i32 = 3;
pub const DEFAULT_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct CertificatePolicy {
    /// Certificates expiring within this many months of "now" read as `expiring`.
    pub expiring_window_months: i32,
    /// Fresh codes tried per participant before giving up.
    pub code_attempts: u32,
}

impl Default for CertificatePolicy {
    fn default() -> Self {
        Self {
            expiring_window_months: DEFAULT_EXPIRING_WINDOW_MONTHS,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

/// Expiry is the issue date plus the standard's validity, in calendar months.
pub fn expiry_date(issue_date: Date, validity_months: i32) -> Date {
    add_months(issue_date, validity_months)
}

/// `expired` if the expiry date has passed, `expiring` if it falls inside the
/// window starting today, otherwise `valid`. Revocation overrides all three.
pub fn classify(certificate: &Certificate, today: Date, window_months: i32) -> CertificateStatus {
    if certificate.is_revoked() {
        return CertificateStatus::Revoked;
    }
    classify_expiry(certificate.expiry_date, today, window_months)
}

pub fn classify_expiry(expiry: Date, today: Date, window_months: i32) -> CertificateStatus {
    if expiry < today {
        CertificateStatus::Expired
    } else if expiry < add_months(today, window_months) {
        CertificateStatus::Expiring
    } else {
        CertificateStatus::Valid
    }
}

/// Produces human-referenceable certificate codes.
pub trait CertificateCodeGenerator: Send + Sync {
    fn generate(&self, standard: &TrainingStandard, issue_date: Date) -> String;
}

/// `PREFIX-STANDARD-YEAR-XXXXXXXXXX` with a random uppercase hex suffix.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    prefix: String,
}

impl RandomCodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl CertificateCodeGenerator for RandomCodeGenerator {
    fn generate(&self, standard: &TrainingStandard, issue_date: Date) -> String {
        let standard_code: String = standard
            .code
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let token = Uuid::new_v4().simple().to_string().to_uppercase();

        format!(
            "{}-{}-{}-{}",
            self.prefix,
            standard_code,
            issue_date.year(),
            &token[..10]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IssuanceOutcome {
    Issued { certificate: Certificate },
    AlreadyCertified { certificate_id: Uuid },
    NotEligible { result: Option<AssessmentResult> },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantIssuance {
    pub participant_id: Uuid,
    #[serde(flatten)]
    pub outcome: IssuanceOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuanceReport {
    pub session_id: Uuid,
    pub issue_date: Date,
    pub outcomes: Vec<ParticipantIssuance>,
}

impl IssuanceReport {
    pub fn issued(&self) -> impl Iterator<Item = &Certificate> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            IssuanceOutcome::Issued { certificate } => Some(certificate),
            _ => None,
        })
    }

    /// Participants who received a certificate in this run, for notification.
    pub fn recipients(&self) -> Vec<Uuid> {
        self.issued().map(|c| c.participant_id).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ParticipantIssuance> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, IssuanceOutcome::Failed { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub status: CertificateStatus,
}

/// Serializes issuance per session within this process. The store's
/// conditional insert still guards against other processes.
#[derive(Debug, Default)]
struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> SessionGuard<'_> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(session_id).or_default().clone()
        };
        SessionGuard {
            locks: self,
            session_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held for the duration of one issuance. The map entry goes away with the
/// last holder.
struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: Uuid,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters hold their own clone of the Arc; only the map's copy means idle.
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

pub struct CertificateIssuer {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CertificateCodeGenerator>,
    policy: CertificatePolicy,
    locks: SessionLocks,
}

impl CertificateIssuer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CertificateCodeGenerator>,
        policy: CertificatePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            codes,
            policy,
            locks: SessionLocks::default(),
        }
    }

    async fn completed_session(&self, session_id: Uuid) -> EngineResult<(TrainingSession, TrainingStandard)> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.status != SessionStatus::Completed {
            return Err(EngineError::SessionNotCompleted {
                session_id,
                status: session.status,
            });
        }

        let standard = self
            .store
            .get_standard(session.training_standard_id)
            .await?
            .ok_or(EngineError::StandardNotFound(session.training_standard_id))?;
        Ok((session, standard))
    }

    /// Inserts with fresh codes until one sticks or attempts run out.
    async fn insert_with_fresh_code(
        &self,
        session: &TrainingSession,
        standard: &TrainingStandard,
        participant_id: Uuid,
        issue_date: Date,
    ) -> EngineResult<CertificateInsert> {
        let expiry = expiry_date(issue_date, standard.validity_months);

        for attempt in 1..=self.policy.code_attempts {
            let candidate = NewCertificate {
                certificate_code: self.codes.generate(standard, issue_date),
                participant_id,
                session_id: session.id,
                training_standard_id: standard.id,
                issue_date,
                expiry_date: expiry,
            };

            match self.store.insert_certificate(&candidate).await? {
                CertificateInsert::CodeCollision => {
                    debug!(%participant_id, attempt, "Certificate code collision, retrying");
                }
                inserted => return Ok(inserted),
            }
        }

        Err(EngineError::CertificateCodeExhausted {
            attempts: self.policy.code_attempts,
        })
    }

    /// Certifies every passing participant of a completed session who does
    /// not already hold a live certificate from it. Safe to call repeatedly:
    /// later runs only pick up participants who passed since.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn issue_certificates(
        &self,
        session_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<IssuanceReport>> {
        let _guard = self.locks.acquire(session_id).await;

        let (session, standard) = self.completed_session(session_id).await.inspect_err(|err| {
            warn!(%session_id, error = %err, "Certificate issuance refused");
        })?;

        let participants = self.store.list_participants(session_id).await?;
        let results: HashMap<Uuid, AssessmentResult> = self
            .store
            .list_assessments(session_id)
            .await?
            .into_iter()
            .map(|a| (a.participant_id, a.result))
            .collect();

        let issue_date = self.clock.today();
        let mut outcomes = Vec::with_capacity(participants.len());

        for enrollment in participants {
            let participant_id = enrollment.participant_id;
            let result = results.get(&participant_id).copied();

            let outcome = if result != Some(AssessmentResult::Pass) {
                IssuanceOutcome::NotEligible { result }
            } else {
                match self
                    .insert_with_fresh_code(&session, &standard, participant_id, issue_date)
                    .await
                {
                    Ok(CertificateInsert::Created(certificate)) => {
                        IssuanceOutcome::Issued { certificate }
                    }
                    Ok(CertificateInsert::AlreadyCertified(existing)) => {
                        IssuanceOutcome::AlreadyCertified {
                            certificate_id: existing.id,
                        }
                    }
                    Ok(CertificateInsert::NotEligible(result)) => {
                        debug!(%session_id, %participant_id, "Eligibility changed before insert");
                        IssuanceOutcome::NotEligible { result }
                    }
                    Ok(CertificateInsert::CodeCollision) => IssuanceOutcome::Failed {
                        kind: "certificate_code_exhausted".to_string(),
                        error: "certificate code collision".to_string(),
                    },
                    Err(err) => {
                        warn!(%session_id, %participant_id, error = %err, "Certificate issuance failed for participant");
                        IssuanceOutcome::Failed {
                            kind: err.kind().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            };

            outcomes.push(ParticipantIssuance {
                participant_id,
                outcome,
            });
        }

        let report = IssuanceReport {
            session_id,
            issue_date,
            outcomes,
        };
        info!(
            %session_id,
            issued = report.recipients().len(),
            failed = report.failures().count(),
            "Certificate issuance finished"
        );

        let issued_ids: Vec<Uuid> = report.issued().map(|c| c.id).collect();
        let audit = AuditRecord::new(
            AuditOperation::CertificatesIssued,
            actor,
            AuditTarget::session(session_id),
            self.clock.now(),
        )
        .with_after(&serde_json::json!({
            "certificate_ids": issued_ids,
            "recipients": report.recipients(),
        }));
        Ok(Audited::new(report, audit))
    }

    /// Certifies a single participant. Returns the existing certificate when
    /// one is already live for the pair.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn issue_for_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        actor: &Actor,
    ) -> EngineResult<Audited<Certificate>> {
        let _guard = self.locks.acquire(session_id).await;

        let (session, standard) = self.completed_session(session_id).await?;
        if self
            .store
            .get_participant(session_id, participant_id)
            .await?
            .is_none()
        {
            return Err(EngineError::ReferentialViolation {
                session_id,
                participant_id,
            });
        }

        let result = self
            .store
            .get_assessment(session_id, participant_id)
            .await?
            .map(|a| a.result);
        if result != Some(AssessmentResult::Pass) {
            return Err(EngineError::NotEligible {
                participant_id,
                result,
            });
        }

        let certificate = match self
            .insert_with_fresh_code(&session, &standard, participant_id, self.clock.today())
            .await?
        {
            CertificateInsert::Created(certificate) => {
                info!(%session_id, %participant_id, code = %certificate.certificate_code, "Certificate issued");
                certificate
            }
            CertificateInsert::AlreadyCertified(existing) => existing,
            CertificateInsert::NotEligible(result) => {
                return Err(EngineError::NotEligible {
                    participant_id,
                    result,
                })
            }
            CertificateInsert::CodeCollision => {
                return Err(EngineError::CertificateCodeExhausted {
                    attempts: self.policy.code_attempts,
                })
            }
        };

        let audit = AuditRecord::new(
            AuditOperation::CertificatesIssued,
            actor,
            AuditTarget {
                session_id: Some(session_id),
                user_id: Some(participant_id),
                certificate_id: Some(certificate.id),
                ..Default::default()
            },
            self.clock.now(),
        )
        .with_after(&certificate);
        Ok(Audited::new(certificate, audit))
    }

    #[instrument(skip(self, reason), fields(actor = %actor.user_id))]
    pub async fn revoke_certificate(
        &self,
        certificate_id: Uuid,
        reason: &str,
        actor: &Actor,
    ) -> EngineResult<Audited<CertificateView>> {
        let before = self
            .store
            .get_certificate(certificate_id)
            .await?
            .ok_or_else(|| EngineError::CertificateNotFound(certificate_id.to_string()))?;
        if before.is_revoked() {
            return Err(EngineError::CertificateAlreadyRevoked(certificate_id));
        }

        let revoked = self
            .store
            .revoke_certificate(certificate_id, reason, self.clock.now())
            .await?
            .ok_or(EngineError::CertificateAlreadyRevoked(certificate_id))?;
        info!(%certificate_id, "Certificate revoked");

        let audit = AuditRecord::new(
            AuditOperation::CertificateRevoked,
            actor,
            AuditTarget::certificate(certificate_id),
            self.clock.now(),
        )
        .with_before(&before)
        .with_after(&revoked);
        Ok(Audited::new(self.view(revoked), audit))
    }

    /// Attaches the status as of the clock's current date.
    pub fn view(&self, certificate: Certificate) -> CertificateView {
        let status = classify(
            &certificate,
            self.clock.today(),
            self.policy.expiring_window_months,
        );
        CertificateView {
            certificate,
            status,
        }
    }

    pub async fn get_certificate(&self, certificate_id: Uuid) -> EngineResult<CertificateView> {
        self.store
            .get_certificate(certificate_id)
            .await?
            .map(|c| self.view(c))
            .ok_or_else(|| EngineError::CertificateNotFound(certificate_id.to_string()))
    }

    pub async fn find_by_code(&self, code: &str) -> EngineResult<CertificateView> {
        self.store
            .find_certificate_by_code(code)
            .await?
            .map(|c| self.view(c))
            .ok_or_else(|| EngineError::CertificateNotFound(code.to_string()))
    }

    pub async fn list_for_session(&self, session_id: Uuid) -> EngineResult<Vec<CertificateView>> {
        Ok(self
            .store
            .list_certificates_for_session(session_id)
            .await?
            .into_iter()
            .map(|c| self.view(c))
            .collect())
    }

    pub async fn list_for_participant(&self, participant_id: Uuid) -> EngineResult<Vec<CertificateView>> {
        Ok(self
            .store
            .list_certificates_for_participant(participant_id)
            .await?
            .into_iter()
            .map(|c| self.view(c))
            .collect())
    }
}
