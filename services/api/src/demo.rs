use clap::{Args, ValueEnum};
use loan_workflow::config::WorkflowConfig;
use loan_workflow::error::AppError;
use loan_workflow::workflows::pinjaman::{
    Action, Actor, ApplicationId, Decision, ExecuteRequest, InMemoryApplicationRepository,
    InMemoryAuditLog, LoanRequest, Role, WorkflowEngine, WorkflowError,
};
use loan_workflow::workflows::pinjaman::registry::legal_actions;
use mockable::DefaultClock;
use std::sync::Arc;

type DemoEngine = WorkflowEngine<InMemoryApplicationRepository, InMemoryAuditLog, DefaultClock>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoDecision {
    #[default]
    Approve,
    Reject,
}

impl From<DemoDecision> for Decision {
    fn from(value: DemoDecision) -> Self {
        match value {
            DemoDecision::Approve => Decision::Approve,
            DemoDecision::Reject => Decision::Reject,
        }
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Final decision recorded once the application reaches the decision stage
    #[arg(long, value_enum, default_value_t = DemoDecision::Approve)]
    pub(crate) decision: DemoDecision,
    /// Stop after the application is returned to intake
    #[arg(long)]
    pub(crate) skip_decision: bool,
    /// Print the audit trail as JSON lines
    #[arg(long)]
    pub(crate) json_events: bool,
}

struct Cast {
    intake: Actor,
    admin_a: Actor,
    admin_b: Actor,
    analyst: Actor,
    decider: Actor,
}

impl Cast {
    fn standard() -> Self {
        Self {
            intake: Actor::new("ina", Role::Intake),
            admin_a: Actor::new("ari", Role::CreditAdmin),
            admin_b: Actor::new("bayu", Role::CreditAdmin),
            analyst: Actor::new("citra", Role::Analyst),
            decider: Actor::new("eka", Role::DecisionMaker),
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let audit = Arc::new(InMemoryAuditLog::default());
    let engine: DemoEngine = WorkflowEngine::new(
        Arc::new(InMemoryApplicationRepository::default()),
        audit.clone(),
        Arc::new(DefaultClock),
        WorkflowConfig::default(),
    );
    let cast = Cast::standard();

    println!("Loan workflow demo");
    let request = LoanRequest {
        borrower_name: "Siti Rahma".to_string(),
        amount: 75_000_000,
        tenor_months: 36,
    };
    let application = engine.submit(&cast.intake, request)?;
    let id = application.id.clone();
    println!("- {} submitted {} -> {}", cast.intake.user_id, id, application.status);

    step(&engine, &id, Action::Take, &cast.admin_a, None, None)?;
    step(&engine, &id, Action::Take, &cast.admin_b, None, None)?;
    step(
        &engine,
        &id,
        Action::Advance,
        &cast.admin_a,
        Some("Documents complete, forwarding"),
        None,
    )?;
    step(&engine, &id, Action::Take, &cast.analyst, None, None)?;
    step(
        &engine,
        &id,
        Action::Return,
        &cast.analyst,
        Some("Missing income proof"),
        None,
    )?;

    if !args.skip_decision {
        println!("\nResubmission and second pass");
        step(
            &engine,
            &id,
            Action::Resubmit,
            &cast.intake,
            Some("Income proof attached"),
            None,
        )?;
        step(&engine, &id, Action::Take, &cast.admin_b, None, None)?;
        step(
            &engine,
            &id,
            Action::Advance,
            &cast.admin_b,
            Some("Income proof verified against payslips"),
            None,
        )?;
        step(&engine, &id, Action::Take, &cast.analyst, None, None)?;
        step(
            &engine,
            &id,
            Action::Advance,
            &cast.analyst,
            Some("Debt service ratio within policy"),
            None,
        )?;
        step(&engine, &id, Action::Take, &cast.decider, None, None)?;
        step(
            &engine,
            &id,
            Action::Decide,
            &cast.decider,
            Some("Committee criteria satisfied"),
            Some(args.decision.into()),
        )?;
        step(&engine, &id, Action::Take, &cast.decider, None, None)?;
    }

    let view = engine.get(&id)?.status_view();
    match serde_json::to_string_pretty(&view) {
        Ok(json) => println!("\nFinal status payload:\n{}", json),
        Err(err) => println!("\nFinal status payload unavailable: {}", err),
    }

    let events = audit.events();
    println!("\nAudit trail ({} events)", events.len());
    for event in &events {
        if args.json_events {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(err) => println!("  event unavailable: {}", err),
            }
        } else {
            println!(
                "  v{} {:?} by {} ({}): {} -> {}",
                event.version,
                event.action,
                event.actor_id,
                event.actor_role,
                event.from_status,
                event.to_status
            );
        }
    }

    Ok(())
}

/// Run one action and print its outcome. Expected rejections are shown, not raised.
fn step(
    engine: &DemoEngine,
    id: &ApplicationId,
    action: Action,
    actor: &Actor,
    note: Option<&str>,
    decision: Option<Decision>,
) -> Result<(), AppError> {
    let mut request = ExecuteRequest::new(id.clone(), action, actor.clone());
    request.note = note.map(str::to_string);
    request.decision = decision;

    match engine.execute(request) {
        Ok(outcome) => {
            let holder = outcome
                .locked_by
                .as_ref()
                .map_or_else(|| "nobody".to_string(), ToString::to_string);
            let next: Vec<&str> = legal_actions(outcome.status)
                .into_iter()
                .map(Action::label)
                .collect();
            let next = if next.is_empty() {
                "none".to_string()
            } else {
                next.join(", ")
            };
            println!(
                "- {} {} ({}): {} -> {} | locked by {} | next: {}",
                actor.user_id, action, actor.role, outcome.from_status, outcome.status, holder, next
            );
            Ok(())
        }
        Err(err @ WorkflowError::Repository(_)) => Err(err.into()),
        Err(err) => {
            println!(
                "- {} {} ({}): rejected [{}] {}",
                actor.user_id,
                action,
                actor.role,
                err.kind(),
                err
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_to_a_decision() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn demo_can_stop_after_the_return() {
        run_demo(DemoArgs {
            decision: DemoDecision::Reject,
            skip_decision: true,
            json_events: true,
        })
        .expect("demo completes");
    }
}
