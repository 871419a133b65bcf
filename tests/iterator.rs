//! Row iterator contract

mod common;

use common::*;
use opalsql::execution;
use opalsql::plan::Node;
use opalsql::types::Value;

#[test]
fn test_next_after_end_keeps_returning_end() {
    let ctx = bare_context();
    let plan = Node::Values {
        rows: vec![vec![lit(1i64)]],
    };
    let mut iter = execution::build(&ctx, &plan).unwrap();

    assert_eq!(iter.next(&ctx), Some(Ok(vec![Value::I64(1)])));
    assert!(iter.next(&ctx).is_none());
    assert!(iter.next(&ctx).is_none());
    assert!(iter.next(&ctx).is_none());
}

#[test]
fn test_close_is_idempotent_and_safe_after_end() {
    let ctx = bare_context();
    let plan = Node::Values {
        rows: vec![vec![lit(1i64)]],
    };
    let mut iter = execution::build(&ctx, &plan).unwrap();
    while iter.next(&ctx).is_some() {}

    assert!(iter.close(&ctx).is_ok());
    assert!(iter.close(&ctx).is_ok());
    assert!(iter.close(&ctx).is_ok());
}

#[test]
fn test_close_before_exhaustion_is_safe() {
    let ctx = bare_context();
    let plan = Node::Values {
        rows: (0..10).map(|i| vec![lit(i as i64)]).collect(),
    };
    let mut iter = execution::build(&ctx, &plan).unwrap();
    assert!(iter.next(&ctx).is_some());
    assert!(iter.close(&ctx).is_ok());
    assert!(iter.close(&ctx).is_ok());
}

#[test]
fn test_error_outcome_repeats() {
    let ctx = bare_context();
    // Division by zero surfaces on the first row and then repeats.
    let plan = Node::Values {
        rows: vec![vec![opalsql::expr::Expression::Arithmetic(
            opalsql::expr::ArithmeticOp::Divide,
            Box::new(lit(1i64)),
            Box::new(lit(0i64)),
        )]],
    };
    let mut iter = execution::build(&ctx, &plan).unwrap();
    let first = iter.next(&ctx);
    assert_eq!(first, Some(Err(opalsql::Error::DivisionByZero)));
    let second = iter.next(&ctx);
    assert_eq!(second, Some(Err(opalsql::Error::DivisionByZero)));
}

#[test]
fn test_cancellation_between_rows() {
    let ctx = bare_context();
    let plan = Node::Values {
        rows: (0..10).map(|i| vec![lit(i as i64)]).collect(),
    };
    let mut iter = execution::build(&ctx, &plan).unwrap();
    assert!(iter.next(&ctx).is_some());

    ctx.cancel_token().cancel();
    assert_eq!(iter.next(&ctx), Some(Err(opalsql::Error::Cancelled)));
    assert_eq!(iter.next(&ctx), Some(Err(opalsql::Error::Cancelled)));
    assert!(iter.close(&ctx).is_ok());
}
