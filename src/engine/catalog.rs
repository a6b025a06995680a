use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::models::{NewTrainingStandard, TrainingStandard, UpdateTrainingStandard};

use super::audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited};
use super::clock::Clock;
use super::error::{EngineError, EngineResult};
use super::store::EntityStore;

/// Training standards: the curricula sessions are scheduled from.
pub struct StandardCatalog {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
}

impl StandardCatalog {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(skip(self, input), fields(code = %input.code, actor = %actor.user_id))]
    pub async fn create_standard(
        &self,
        input: NewTrainingStandard,
        actor: &Actor,
    ) -> EngineResult<Audited<TrainingStandard>> {
        input.validate()?;
        let standard = self.store.insert_standard(&input).await?;
        info!(standard_id = %standard.id, "Training standard created");

        let audit = AuditRecord::new(
            AuditOperation::StandardCreated,
            actor,
            AuditTarget::standard(standard.id),
            self.clock.now(),
        )
        .with_after(&standard);
        Ok(Audited::new(standard, audit))
    }

    pub async fn get_standard(&self, standard_id: Uuid) -> EngineResult<TrainingStandard> {
        self.store
            .get_standard(standard_id)
            .await?
            .ok_or(EngineError::StandardNotFound(standard_id))
    }

    /// Edits are refused once any session references the standard, so issued
    /// certificates never change meaning after the fact.
    #[instrument(skip(self, input), fields(actor = %actor.user_id))]
    pub async fn update_standard(
        &self,
        standard_id: Uuid,
        input: UpdateTrainingStandard,
        actor: &Actor,
    ) -> EngineResult<Audited<TrainingStandard>> {
        input.validate()?;
        let before = self.get_standard(standard_id).await?;
        if self.store.count_sessions_for_standard(standard_id).await? > 0 {
            return Err(EngineError::StandardInUse(standard_id));
        }

        let updated = self
            .store
            .update_standard(standard_id, &input)
            .await?
            .ok_or(EngineError::StandardNotFound(standard_id))?;
        info!(%standard_id, "Training standard updated");

        let audit = AuditRecord::new(
            AuditOperation::StandardUpdated,
            actor,
            AuditTarget::standard(standard_id),
            self.clock.now(),
        )
        .with_before(&before)
        .with_after(&updated);
        Ok(Audited::new(updated, audit))
    }

    /// Retiring a standard only blocks new sessions; existing ones are untouched.
    #[instrument(skip(self), fields(actor = %actor.user_id))]
    pub async fn set_standard_active(
        &self,
        standard_id: Uuid,
        is_active: bool,
        actor: &Actor,
    ) -> EngineResult<Audited<TrainingStandard>> {
        let before = self.get_standard(standard_id).await?;
        let updated = self
            .store
            .set_standard_active(standard_id, is_active)
            .await?
            .ok_or(EngineError::StandardNotFound(standard_id))?;

        let audit = AuditRecord::new(
            AuditOperation::StandardActivationChanged,
            actor,
            AuditTarget::standard(standard_id),
            self.clock.now(),
        )
        .with_before(&before.is_active)
        .with_after(&updated.is_active);
        Ok(Audited::new(updated, audit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DeliveryMode, NewTrainingSession};
    use crate::engine::audit::Role;
    use crate::engine::clock::SystemClock;
    use crate::engine::memory::InMemoryStore;
    use time::macros::date;

    fn catalog() -> (StandardCatalog, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (StandardCatalog::new(store.clone(), Arc::new(SystemClock)), store)
    }

    fn admin() -> Actor {
        Actor::new(Uuid::new_v4(), Role::PlatformAdmin)
    }

    fn standard_input() -> NewTrainingStandard {
        NewTrainingStandard {
            code: "CRM-01".to_string(),
            title: "Crew Resource Management".to_string(),
            validity_months: 24,
        }
    }

    #[tokio::test]
    async fn test_create_standard_records_audit() {
        let (catalog, _) = catalog();
        let actor = admin();

        let created = catalog.create_standard(standard_input(), &actor).await.unwrap();

        assert!(created.value.is_active);
        assert_eq!(created.audit.operation, AuditOperation::StandardCreated);
        assert_eq!(created.audit.target.standard_id, Some(created.value.id));
        assert_eq!(created.audit.actor, actor);
    }

    #[tokio::test]
    async fn test_create_standard_rejects_zero_validity() {
        let (catalog, _) = catalog();
        let input = NewTrainingStandard {
            validity_months: 0,
            ..standard_input()
        };

        let result = catalog.create_standard(input, &admin()).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_allowed_until_referenced() {
        let (catalog, store) = catalog();
        let actor = admin();
        let standard = catalog
            .create_standard(standard_input(), &actor)
            .await
            .unwrap()
            .into_value();

        let updated = catalog
            .update_standard(
                standard.id,
                UpdateTrainingStandard {
                    validity_months: Some(36),
                    ..Default::default()
                },
                &actor,
            )
            .await
            .unwrap();
        assert_eq!(updated.value.validity_months, 36);

        store
            .insert_session(&NewTrainingSession {
                training_standard_id: standard.id,
                start_date: date!(2025 - 03 - 01),
                end_date: date!(2025 - 03 - 03),
                location: None,
                delivery_mode: DeliveryMode::InPerson,
            })
            .await
            .unwrap();

        let result = catalog
            .update_standard(
                standard.id,
                UpdateTrainingStandard {
                    validity_months: Some(12),
                    ..Default::default()
                },
                &actor,
            )
            .await;
        assert_eq!(result.unwrap_err(), EngineError::StandardInUse(standard.id));
        assert_eq!(catalog.get_standard(standard.id).await.unwrap().validity_months, 36);
    }
}
