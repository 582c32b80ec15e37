use std::sync::Arc;

use tracing::debug;

use super::domain::{ApplicationId, Stage, StageOwners, UserId};
use super::error::WorkflowError;
use super::repository::ApplicationRepository;

/// Result of recording a stage owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRecord {
    Recorded,
    AlreadyOwner,
    /// A different worker already owns the stage; nothing changed.
    KeptExisting(UserId),
}

impl StageOwners {
    pub fn owner(&self, stage: Stage) -> Option<&UserId> {
        match stage {
            Stage::CreditAdmin => self.credit_admin.as_ref(),
            Stage::Analysis => self.analyst.as_ref(),
            Stage::Decision => self.decision.as_ref(),
        }
    }

    fn slot_mut(&mut self, stage: Stage) -> &mut Option<UserId> {
        match stage {
            Stage::CreditAdmin => &mut self.credit_admin,
            Stage::Analysis => &mut self.analyst,
            Stage::Decision => &mut self.decision,
        }
    }

    /// Set the owner of `stage` if nobody owns it yet. Owners are never cleared.
    pub fn record(&mut self, stage: Stage, user: &UserId) -> OwnerRecord {
        let slot = self.slot_mut(stage);
        if let Some(existing) = slot.as_ref() {
            return if existing == user {
                OwnerRecord::AlreadyOwner
            } else {
                OwnerRecord::KeptExisting(existing.clone())
            };
        }
        *slot = Some(user.clone());
        OwnerRecord::Recorded
    }

    pub fn eligible(&self, stage: Stage, user: &UserId) -> bool {
        self.owner(stage).map_or(true, |owner| owner == user)
    }
}

/// Sticky per-stage assignments, read and written through the application store.
///
/// Each call is its own store transaction. The engine records owners inside
/// the transaction of the `take` that earns them; this facade serves callers
/// outside that path, such as admin tooling and store adapters.
pub struct AssignmentStore<R> {
    repository: Arc<R>,
}

impl<R> AssignmentStore<R>
where
    R: ApplicationRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    fn owners(&self, id: &ApplicationId) -> Result<StageOwners, WorkflowError> {
        self.repository
            .fetch(id)?
            .map(|application| application.owners)
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    pub fn owner(&self, id: &ApplicationId, stage: Stage) -> Result<Option<UserId>, WorkflowError> {
        Ok(self.owners(id)?.owner(stage).cloned())
    }

    /// Record `user` as owner of `stage` unless someone already holds it.
    pub fn record_owner(
        &self,
        id: &ApplicationId,
        stage: Stage,
        user: &UserId,
    ) -> Result<OwnerRecord, WorkflowError> {
        let outcome = self
            .repository
            .transact(id, |application| -> Result<OwnerRecord, WorkflowError> {
                Ok(application.owners.record(stage, user))
            })
            .map_err(|err| err.for_application(id))?;
        debug!(application_id = %id, stage = stage.label(), user = %user, ?outcome, "stage owner recorded");
        Ok(outcome)
    }

    pub fn eligible_to_claim(
        &self,
        id: &ApplicationId,
        stage: Stage,
        user: &UserId,
    ) -> Result<bool, WorkflowError> {
        Ok(self.owners(id)?.eligible(stage, user))
    }
}
