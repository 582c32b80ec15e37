use super::domain::{ApplicationId, LoanApplication};

/// Backing store for loan applications. The application id is the index and
/// the store is the arena; all workflow state lives on the stored record.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: LoanApplication) -> Result<LoanApplication, RepositoryError>;

    fn fetch(&self, id: &ApplicationId) -> Result<Option<LoanApplication>, RepositoryError>;

    /// Non-terminal applications accepted by `matches`, oldest first.
    ///
    /// `matches` runs before `limit` is applied, so records beyond the first
    /// `limit` open applications are still reachable.
    fn open_matching<P>(&self, limit: usize, matches: P) -> Result<Vec<LoanApplication>, RepositoryError>
    where
        P: FnMut(&LoanApplication) -> bool;

    /// Apply `mutate` to the stored record as one atomic unit.
    ///
    /// The closure sees the current committed state. Returning `Ok` commits the
    /// mutated record and bumps its `version` by one; returning `Err` leaves storage
    /// untouched. No other `transact` on the same id may interleave.
    fn transact<T, E, F>(&self, id: &ApplicationId, mutate: F) -> Result<T, E>
    where
        F: FnOnce(&mut LoanApplication) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
