use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::models::{Assessment, AssessmentInput, AssessmentWrite};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::Clock;
use super::error::{EngineError, EngineResult};
use super::store::EntityStore;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Rejects scores outside 0..=100 (and NaN) before they reach the store.
pub fn validate_score(score: Option<f64>) -> EngineResult<()> {
    match score {
        Some(value) if !(MIN_SCORE..=MAX_SCORE).contains(&value) => {
            Err(EngineError::InvalidScore { score: value })
        }
        _ => Ok(()),
    }
}

/// Outcome for one row of a bulk recording.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Recorded(Assessment),
    Rejected(EngineError),
    /// Valid on its own, but not written because the atomic batch failed.
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    pub participant_id: Uuid,
    pub outcome: RowOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkRecordReport {
    pub session_id: Uuid,
    /// Whether the batch was applied all-or-nothing.
    pub atomic: bool,
    pub rows: Vec<BulkRow>,
    /// Store failure that aborted an atomic batch after validation passed.
    pub batch_error: Option<EngineError>,
}

impl BulkRecordReport {
    pub fn recorded(&self) -> impl Iterator<Item = &Assessment> {
        self.rows.iter().filter_map(|row| match &row.outcome {
            RowOutcome::Recorded(assessment) => Some(assessment),
            _ => None,
        })
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded().count()
    }

    pub fn is_complete(&self) -> bool {
        self.recorded_count() == self.rows.len()
    }
}

pub struct AssessmentRecorder {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
}

impl AssessmentRecorder {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn prepare(input: &AssessmentInput, grader: &Actor) -> EngineResult<AssessmentWrite> {
        validate_score(input.score)?;
        input.validate()?;
        Ok(AssessmentWrite {
            participant_id: input.participant_id,
            score: input.score,
            result: input.result.unwrap_or_default(),
            remarks: input.remarks.clone().unwrap_or_default(),
            graded_by: grader.user_id,
        })
    }

    async fn require_session(&self, session_id: Uuid) -> EngineResult<()> {
        self.store
            .get_session(session_id)
            .await?
            .map(|_| ())
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    /// Upserts the (session, participant) assessment. A second call overwrites
    /// the first; the row count never grows.
    #[instrument(skip(self, input), fields(participant_id = %input.participant_id, actor = %actor.user_id))]
    pub async fn record_assessment(
        &self,
        session_id: Uuid,
        input: AssessmentInput,
        actor: &Actor,
    ) -> EngineResult<Audited<Assessment>> {
        let row = Self::prepare(&input, actor)?;
        self.require_session(session_id).await?;

        if self
            .store
            .get_participant(session_id, row.participant_id)
            .await?
            .is_none()
        {
            warn!(%session_id, "Assessment for participant without enrollment");
            return Err(EngineError::ReferentialViolation {
                session_id,
                participant_id: row.participant_id,
            });
        }

        let before = self.store.get_assessment(session_id, row.participant_id).await?;
        let assessment = self.store.upsert_assessment(session_id, &row).await?;
        info!(%session_id, result = ?assessment.result, "Assessment recorded");

        let mut audit = AuditRecord::new(
            AuditOperation::AssessmentRecorded,
            actor,
            AuditTarget::session_user(session_id, row.participant_id),
            self.clock.now(),
        )
        .with_after(&assessment);
        if let Some(before) = &before {
            audit = audit.with_before(before);
        }
        Ok(Audited::new(assessment, audit))
    }

    /// Records a batch. When the store supports multi-row atomicity the batch
    /// commits entirely or not at all; otherwise rows succeed or fail
    /// independently. Either way every row reports its own outcome.
    #[instrument(skip(self, inputs), fields(rows = inputs.len(), actor = %actor.user_id))]
    pub async fn bulk_record(
        &self,
        session_id: Uuid,
        inputs: Vec<AssessmentInput>,
        actor: &Actor,
    ) -> EngineResult<Audited<BulkRecordReport>> {
        self.require_session(session_id).await?;

        let enrolled: HashSet<Uuid> = self
            .store
            .list_participants(session_id)
            .await?
            .into_iter()
            .map(|e| e.participant_id)
            .collect();

        let mut seen = HashSet::new();
        let prepared: Vec<(Uuid, EngineResult<AssessmentWrite>)> = inputs
            .iter()
            .map(|input| {
                let row = Self::prepare(input, actor).and_then(|row| {
                    if !seen.insert(row.participant_id) {
                        Err(EngineError::Validation(format!(
                            "participant {} appears more than once in the batch",
                            row.participant_id
                        )))
                    } else if !enrolled.contains(&row.participant_id) {
                        Err(EngineError::ReferentialViolation {
                            session_id,
                            participant_id: row.participant_id,
                        })
                    } else {
                        Ok(row)
                    }
                });
                (input.participant_id, row)
            })
            .collect();

        let atomic = self.store.supports_atomic_batches();
        let report = if atomic {
            self.apply_atomic(session_id, prepared).await
        } else {
            self.apply_independent(session_id, prepared).await
        };

        info!(
            %session_id,
            atomic,
            recorded = report.recorded_count(),
            total = report.rows.len(),
            "Bulk assessment recording finished"
        );

        let recorded: Vec<Uuid> = report.recorded().map(|a| a.participant_id).collect();
        let audit = AuditRecord::new(
            AuditOperation::AssessmentsBulkRecorded,
            actor,
            AuditTarget::session(session_id),
            self.clock.now(),
        )
        .with_after(&recorded);
        Ok(Audited::new(report, audit))
    }

    async fn apply_atomic(
        &self,
        session_id: Uuid,
        prepared: Vec<(Uuid, EngineResult<AssessmentWrite>)>,
    ) -> BulkRecordReport {
        let mut report = BulkRecordReport {
            session_id,
            atomic: true,
            rows: Vec::with_capacity(prepared.len()),
            batch_error: None,
        };

        if prepared.iter().any(|(_, row)| row.is_err()) {
            report.rows = prepared
                .into_iter()
                .map(|(participant_id, row)| BulkRow {
                    participant_id,
                    outcome: match row {
                        Ok(_) => RowOutcome::RolledBack,
                        Err(err) => RowOutcome::Rejected(err),
                    },
                })
                .collect();
            return report;
        }

        let (ids, rows): (Vec<Uuid>, Vec<AssessmentWrite>) = prepared
            .into_iter()
            .filter_map(|(id, row)| row.ok().map(|row| (id, row)))
            .unzip();

        match self.store.upsert_assessments(session_id, &rows).await {
            Ok(written) => {
                report.rows = written
                    .into_iter()
                    .map(|assessment| BulkRow {
                        participant_id: assessment.participant_id,
                        outcome: RowOutcome::Recorded(assessment),
                    })
                    .collect();
            }
            Err(err) => {
                warn!(%session_id, error = %err, "Atomic assessment batch rolled back");
                report.rows = ids
                    .into_iter()
                    .map(|participant_id| BulkRow {
                        participant_id,
                        outcome: RowOutcome::RolledBack,
                    })
                    .collect();
                report.batch_error = Some(err);
            }
        }
        report
    }

    async fn apply_independent(
        &self,
        session_id: Uuid,
        prepared: Vec<(Uuid, EngineResult<AssessmentWrite>)>,
    ) -> BulkRecordReport {
        let mut rows = Vec::with_capacity(prepared.len());
        for (participant_id, row) in prepared {
            let outcome = match row {
                Ok(row) => match self.store.upsert_assessment(session_id, &row).await {
                    Ok(assessment) => RowOutcome::Recorded(assessment),
                    Err(err) => RowOutcome::Rejected(err),
                },
                Err(err) => RowOutcome::Rejected(err),
            };
            rows.push(BulkRow {
                participant_id,
                outcome,
            });
        }

        BulkRecordReport {
            session_id,
            atomic: false,
            rows,
            batch_error: None,
        }
    }

    pub async fn get_assessment(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> EngineResult<Option<Assessment>> {
        self.store.get_assessment(session_id, participant_id).await
    }

    pub async fn list_assessments(&self, session_id: Uuid) -> EngineResult<Vec<Assessment>> {
        self.store.list_assessments(session_id).await
    }
}
