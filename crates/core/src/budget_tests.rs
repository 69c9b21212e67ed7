// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_budget_never_fires() {
    let usage = ResourceUsage::new();
    usage.add_tokens(1_000_000);
    usage.add_step();
    usage.add_api_call();
    usage.add_cost(99.0);
    assert!(Budget::default().check(&usage).is_ok());
}

#[test]
fn step_limit_fires_at_the_boundary() {
    let usage = ResourceUsage::new();
    let budget = Budget::max_steps(2);
    usage.add_step();
    assert!(budget.check(&usage).is_ok());
    usage.add_step();
    let err = budget.check(&usage).unwrap_err();
    match err {
        EngineError::BudgetExceeded { usage: snap, budget: b, .. } => {
            assert_eq!(snap.steps_executed, 2);
            assert_eq!(b.max_steps, Some(2));
        }
        other => panic!("expected BudgetExceeded, got {:?}", other),
    }
}

#[test]
fn token_limit_allows_exact_and_fires_over() {
    let usage = ResourceUsage::new();
    let budget = Budget { max_tokens: Some(100), ..Budget::default() };
    usage.add_tokens(100);
    assert!(budget.check(&usage).is_ok());
    usage.add_tokens(1);
    assert!(budget.check(&usage).is_err());
}

#[test]
fn child_usage_mirrors_into_parent() {
    let parent = Arc::new(ResourceUsage::new());
    let child = ResourceUsage::child(&parent);
    child.add_tokens(10);
    child.add_step();
    child.add_api_call();
    assert_eq!(parent.snapshot().tokens, 10);
    assert_eq!(parent.snapshot().steps_executed, 1);
    assert_eq!(parent.snapshot().api_calls, 1);
    assert_eq!(child.snapshot().tokens, 10);
}

#[test]
fn parent_increments_do_not_reach_child() {
    let parent = Arc::new(ResourceUsage::new());
    let child = ResourceUsage::child(&parent);
    parent.add_tokens(50);
    assert_eq!(child.snapshot().tokens, 0);
}

#[test]
fn cost_limit_fires() {
    let usage = ResourceUsage::new();
    let budget = Budget { max_cost_dollars: Some(0.5), ..Budget::default() };
    usage.add_cost(0.6);
    let err = budget.check(&usage).unwrap_err();
    assert!(err.to_string().contains("cost"));
}
