use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{ApplicationId, LoanApplication};
use super::events::{AuditError, AuditSink, WorkflowEvent};
use super::repository::{ApplicationRepository, RepositoryError};

/// Mutex-backed store. `transact` holds the map lock for the whole
/// read-modify-write, which makes it the compare-and-set point for claims.
#[derive(Debug, Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, LoanApplication>>>,
}

impl InMemoryApplicationRepository {
    fn records(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ApplicationId, LoanApplication>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, application: LoanApplication) -> Result<LoanApplication, RepositoryError> {
        let mut guard = self.records()?;
        if guard.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError> {
        let guard = self.records()?;
        Ok(guard.get(id).cloned())
    }

    fn open_matching<P>(
        &self,
        limit: usize,
        mut matches: P,
    ) -> Result<Vec<LoanApplication>, RepositoryError>
    where
        P: FnMut(&LoanApplication) -> bool,
    {
        let guard = self.records()?;
        let mut open: Vec<LoanApplication> = guard
            .values()
            .filter(|application| !application.status.is_terminal() && matches(application))
            .cloned()
            .collect();
        open.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        open.truncate(limit);
        Ok(open)
    }

    fn transact<T, E, F>(&self, id: &ApplicationId, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut LoanApplication) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.records()?;
        let current = guard.get(id).ok_or(RepositoryError::NotFound)?;

        let mut draft = current.clone();
        let output = mutate(&mut draft)?;
        draft.id = id.clone();
        draft.version = current.version + 1;
        guard.insert(id.clone(), draft);
        Ok(output)
    }
}

/// Append-only audit log kept in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl InMemoryAuditLog {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, event: &WorkflowEvent) -> Result<(), AuditError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|err| AuditError::Transport(err.to_string()))?;
        guard.push(event.clone());
        Ok(())
    }
}
