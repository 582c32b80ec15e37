//! Loan application ("pinjaman") back-office pipeline.
//!
//! Applications move from intake through credit-admin review, analysis, and a
//! final decision. Workers claim an application before acting on it, each stage
//! keeps a sticky owner of record, and every committed transition is handed to
//! the audit sink and the event stream.

pub mod assignment;
pub mod authorization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod lock;
pub mod memory;
pub mod registry;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentStore, OwnerRecord};
pub use authorization::{AuthorizationRules, PermissionSet, ResubmissionPolicy};
pub use domain::{
    Action, Actor, ApplicationId, ApplicationStatus, ApplicationStatusView, Decision,
    LoanApplication, LoanRequest, Lock, Role, Stage, StageOwners, UserId,
};
pub use engine::{ExecuteRequest, ExecutionOutcome, WorkflowEngine};
pub use error::{ForbiddenReason, ValidationError, WorkflowError};
pub use events::{
    spawn_audit_forwarder, AuditError, AuditSink, EventEmitter, EventKind, QueuedAuditSink,
    RetryPolicy, TracingAuditSink, WorkflowEvent,
};
pub use lock::{ExpiredLock, LockManager, LockPolicy};
pub use memory::{InMemoryApplicationRepository, InMemoryAuditLog};
pub use registry::{TransitionRule, TRANSITIONS};
pub use repository::{ApplicationRepository, RepositoryError};
pub use router::pinjaman_router;
