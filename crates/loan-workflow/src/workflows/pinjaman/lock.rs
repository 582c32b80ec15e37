//! Exclusive claim manager. At most one worker holds an application at a time;
//! every grant is a compare-and-set performed inside a store transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use tracing::{debug, warn};

use super::domain::{ApplicationId, ApplicationStatus, LoanApplication, Lock, UserId};
use super::error::WorkflowError;
use super::repository::ApplicationRepository;

/// Lock lifetime rules. Without a TTL a lock lives until released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockPolicy {
    pub ttl: Option<Duration>,
}

impl LockPolicy {
    pub const fn without_expiry() -> Self {
        Self { ttl: None }
    }

    pub const fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }

    pub fn is_expired(&self, lock: &Lock, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => lock.acquired_at + ttl <= now,
            None => false,
        }
    }

    /// The holder whose claim is still in force, if any.
    pub fn live_holder<'a>(
        &self,
        application: &'a LoanApplication,
        now: DateTime<Utc>,
    ) -> Option<&'a UserId> {
        application
            .lock
            .as_ref()
            .filter(|lock| !self.is_expired(lock, now))
            .map(|lock| &lock.holder)
    }

    /// Compare-and-set on a record already inside a transaction.
    pub fn claim(
        &self,
        application: &mut LoanApplication,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Lock, WorkflowError> {
        if let Some(holder) = self.live_holder(application, now) {
            return Err(WorkflowError::Conflict {
                holder: holder.clone(),
            });
        }

        if let Some(stale) = application.lock.as_ref() {
            warn!(
                application_id = %application.id,
                stale_holder = %stale.holder,
                acquired_at = %stale.acquired_at,
                "replacing expired lock"
            );
        }

        let lock = Lock {
            holder: user.clone(),
            acquired_at: now,
        };
        application.lock = Some(lock.clone());
        Ok(lock)
    }

    pub fn require_held(
        &self,
        application: &LoanApplication,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        match self.live_holder(application, now) {
            Some(holder) if holder == user => Ok(()),
            Some(holder) => Err(WorkflowError::NotLockHolder {
                holder: Some(holder.clone()),
            }),
            None => Err(WorkflowError::NotLocked),
        }
    }

    /// Clear the lock if `user` holds it.
    ///
    /// An unlocked application also answers `NotLockHolder`, so a repeated
    /// release fails without touching state.
    pub fn release(
        &self,
        application: &mut LoanApplication,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Lock, WorkflowError> {
        match self.live_holder(application, now) {
            Some(holder) if holder == user => {}
            holder => {
                return Err(WorkflowError::NotLockHolder {
                    holder: holder.cloned(),
                })
            }
        }
        application.lock.take().ok_or(WorkflowError::NotLocked)
    }
}

/// Lock removed by the reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredLock {
    pub application_id: ApplicationId,
    pub lock: Lock,
    pub status: ApplicationStatus,
    /// Record version after the lock was cleared.
    pub version: u64,
}

/// Store-backed lock operations for callers outside the engine transaction.
///
/// `execute` applies [`LockPolicy`] to the record it already holds inside
/// `transact`, so claim and action commit together. `try_claim`, `release`,
/// and `require_held` give adapters the same rules one transaction at a time;
/// `reap_expired` is what the engine's reaper runs.
pub struct LockManager<R, C> {
    repository: Arc<R>,
    clock: Arc<C>,
    policy: LockPolicy,
}

impl<R, C> LockManager<R, C>
where
    R: ApplicationRepository,
    C: Clock + Send + Sync,
{
    pub fn new(repository: Arc<R>, clock: Arc<C>, policy: LockPolicy) -> Self {
        Self {
            repository,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Grant the lock iff nobody holds it at the instant of the check-and-set.
    pub fn try_claim(&self, id: &ApplicationId, user: &UserId) -> Result<Lock, WorkflowError> {
        let now = self.now();
        let lock = self
            .repository
            .transact(id, |application| self.policy.claim(application, user, now))
            .map_err(|err| err.for_application(id))?;
        debug!(application_id = %id, holder = %user, "lock granted");
        Ok(lock)
    }

    pub fn release(&self, id: &ApplicationId, user: &UserId) -> Result<(), WorkflowError> {
        let now = self.now();
        self.repository
            .transact(id, |application| self.policy.release(application, user, now))
            .map_err(|err| err.for_application(id))?;
        debug!(application_id = %id, holder = %user, "lock released");
        Ok(())
    }

    pub fn require_held(&self, id: &ApplicationId, user: &UserId) -> Result<(), WorkflowError> {
        let application = self
            .repository
            .fetch(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))?;
        self.policy.require_held(&application, user, self.now())
    }

    /// Clear every lock whose TTL has elapsed. A no-op without a TTL.
    pub fn reap_expired(&self, scan_limit: usize) -> Result<Vec<ExpiredLock>, WorkflowError> {
        if self.policy.ttl.is_none() {
            return Ok(Vec::new());
        }

        let now = self.now();
        let stale = self.repository.open_matching(scan_limit, |application| {
            application
                .lock
                .as_ref()
                .is_some_and(|lock| self.policy.is_expired(lock, now))
        })?;

        let mut reaped = Vec::new();
        for candidate in stale {
            // Re-check under the transaction; the holder may have released or
            // someone may have reclaimed since the scan.
            let outcome = self.repository.transact(
                &candidate.id,
                |application| -> Result<Option<ExpiredLock>, WorkflowError> {
                    match application.lock.as_ref() {
                        Some(lock) if self.policy.is_expired(lock, now) => {
                            application.updated_at = now;
                            Ok(application.lock.take().map(|lock| ExpiredLock {
                                application_id: application.id.clone(),
                                lock,
                                status: application.status,
                                version: application.version + 1,
                            }))
                        }
                        _ => Err(WorkflowError::NotLocked),
                    }
                },
            );

            match outcome {
                Ok(Some(expired)) => {
                    warn!(
                        application_id = %candidate.id,
                        holder = %expired.lock.holder,
                        acquired_at = %expired.lock.acquired_at,
                        "expired lock reaped"
                    );
                    reaped.push(expired);
                }
                Ok(None) | Err(WorkflowError::NotLocked) => {}
                Err(err) => return Err(err.for_application(&candidate.id)),
            }
        }
        Ok(reaped)
    }
}
