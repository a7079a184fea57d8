//! Structural checks on a compiled document using Validation.
//!
//! Every check runs and every failure is kept, so an author sees all the
//! problems in one build instead of fixing them one at a time.

use super::document::Document;
use super::error::DocumentIssue;
use crate::core::{StateId, TransitionId};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub(crate) type Check = Validation<(), NonEmptyVec<DocumentIssue>>;

/// Run every structural check, folding in `issues` already found while
/// lowering the tree.
pub(crate) fn document<D>(doc: &Document<D>, issues: Vec<DocumentIssue>) -> Check {
    let mut checks: Vec<Check> = issues.into_iter().map(Validation::fail).collect();

    for (id, state) in doc.states() {
        if let Some(initial) = state.initial() {
            checks.push(initial_targets(doc, id, initial));
        }
        for transition in state.transitions() {
            checks.push(target_set(doc, *transition));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Default-entry targets must lie inside their state and be enterable together.
fn initial_targets<D>(doc: &Document<D>, state: StateId, initial: TransitionId) -> Check {
    let targets = doc.transition(initial).targets();
    let mut checks: Vec<Check> = targets
        .iter()
        .map(|target| {
            if doc.is_descendant(*target, state) {
                Validation::success(())
            } else {
                Validation::fail(DocumentIssue::InitialNotDescendant {
                    state: doc.name(state).to_string(),
                    target: doc.name(*target).to_string(),
                })
            }
        })
        .collect();
    checks.push(target_set(doc, initial));

    Validation::all_vec(checks).map(|_| ())
}

/// Every pair of targets must be nested or in different parallel regions.
fn target_set<D>(doc: &Document<D>, transition: TransitionId) -> Check {
    let node = doc.transition(transition);
    if doc.is_legal_set(node.targets()) {
        Validation::success(())
    } else {
        Validation::fail(DocumentIssue::IllegalTargetSet {
            state: doc.name(node.source()).to_string(),
            targets: node
                .targets()
                .iter()
                .map(|t| doc.name(*t).to_string())
                .collect(),
        })
    }
}
