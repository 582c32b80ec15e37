use rstest::rstest;

use crate::workflows::pinjaman::domain::{Action, ApplicationStatus, Decision, Role};
use crate::workflows::pinjaman::error::{ValidationError, WorkflowError};
use crate::workflows::pinjaman::registry::{
    legal_actions, lookup, successors, Target, TRANSITIONS,
};

use ApplicationStatus::{
    Analyzing, Approved, ReadyForDecision, Rejected, Returned, Submitted, UnderReview,
};

#[rstest]
#[case(Submitted, Action::Take, Some(Role::CreditAdmin))]
#[case(UnderReview, Action::Take, Some(Role::CreditAdmin))]
#[case(UnderReview, Action::Release, None)]
#[case(UnderReview, Action::Advance, Some(Role::CreditAdmin))]
#[case(UnderReview, Action::Return, Some(Role::CreditAdmin))]
#[case(Analyzing, Action::Take, Some(Role::Analyst))]
#[case(Analyzing, Action::Release, None)]
#[case(Analyzing, Action::Advance, Some(Role::Analyst))]
#[case(Analyzing, Action::Return, Some(Role::Analyst))]
#[case(ReadyForDecision, Action::Take, Some(Role::DecisionMaker))]
#[case(ReadyForDecision, Action::Release, None)]
#[case(ReadyForDecision, Action::Decide, Some(Role::DecisionMaker))]
#[case(ReadyForDecision, Action::Return, Some(Role::DecisionMaker))]
#[case(Returned, Action::Resubmit, Some(Role::Intake))]
fn listed_pairs_resolve_to_their_row(
    #[case] status: ApplicationStatus,
    #[case] action: Action,
    #[case] role: Option<Role>,
) {
    let rule = lookup(status, action).expect("pair is in the table");
    assert_eq!(rule.from, status);
    assert_eq!(rule.action, action);
    assert_eq!(rule.role, role);
}

#[test]
fn every_unlisted_pair_is_an_invalid_transition() {
    for status in ApplicationStatus::ALL {
        if status.is_terminal() {
            continue;
        }
        for action in Action::ALL {
            let listed = TRANSITIONS
                .iter()
                .any(|rule| rule.from == status && rule.action == action);
            if listed {
                continue;
            }
            assert_eq!(
                lookup(status, action),
                Err(WorkflowError::InvalidTransition { status, action }),
                "{status} / {action}"
            );
        }
    }
}

#[rstest]
fn terminal_statuses_reject_every_action(
    #[values(Approved, Rejected)] status: ApplicationStatus,
    #[values(
        Action::Take,
        Action::Release,
        Action::Advance,
        Action::Return,
        Action::Decide,
        Action::Resubmit
    )]
    action: Action,
) {
    assert_eq!(lookup(status, action), Err(WorkflowError::Terminal(status)));
}

#[rstest]
#[case(Submitted, Action::Take, UnderReview)]
#[case(UnderReview, Action::Take, UnderReview)]
#[case(UnderReview, Action::Release, UnderReview)]
#[case(UnderReview, Action::Advance, Analyzing)]
#[case(Analyzing, Action::Advance, ReadyForDecision)]
#[case(Analyzing, Action::Return, Returned)]
#[case(ReadyForDecision, Action::Return, Returned)]
#[case(Returned, Action::Resubmit, Submitted)]
fn rows_resolve_fixed_targets(
    #[case] status: ApplicationStatus,
    #[case] action: Action,
    #[case] expected: ApplicationStatus,
) {
    let rule = lookup(status, action).expect("legal");
    assert_eq!(rule.resolve(None), Ok(expected));
}

#[test]
fn decide_row_depends_on_the_selection() {
    let rule = lookup(ReadyForDecision, Action::Decide).expect("legal");
    assert_eq!(rule.target, Target::ByDecision);
    assert_eq!(rule.resolve(Some(Decision::Approve)), Ok(Approved));
    assert_eq!(rule.resolve(Some(Decision::Reject)), Ok(Rejected));
    assert_eq!(rule.resolve(None), Err(ValidationError::MissingDecision));
}

#[test]
fn legal_actions_follow_the_table() {
    assert_eq!(legal_actions(Submitted), vec![Action::Take]);
    assert_eq!(
        legal_actions(UnderReview),
        vec![Action::Take, Action::Release, Action::Advance, Action::Return]
    );
    assert_eq!(
        legal_actions(ReadyForDecision),
        vec![Action::Take, Action::Release, Action::Decide, Action::Return]
    );
    assert_eq!(legal_actions(Returned), vec![Action::Resubmit]);
    assert!(legal_actions(Approved).is_empty());
}

#[test]
fn successors_describe_the_pipeline_graph() {
    assert_eq!(successors(Submitted), vec![UnderReview]);
    assert_eq!(successors(UnderReview), vec![Analyzing, Returned]);
    assert_eq!(successors(Analyzing), vec![ReadyForDecision, Returned]);
    assert_eq!(
        successors(ReadyForDecision),
        vec![Approved, Rejected, Returned]
    );
    assert_eq!(successors(Returned), vec![Submitted]);
    assert!(successors(Rejected).is_empty());
}
