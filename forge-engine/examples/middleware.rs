//! Middleware example: timing and gating middleware around operations.
//!
//! Run with: cargo run --example middleware -p forge-engine

use forge_core::{Foundry, OperationError, WorkflowBuilder, middleware_fn};
use forge_engine::Smith;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let foundry = Foundry::new();

    // 1. A timing middleware (outermost — added first).
    foundry
        .add_middleware(Arc::new(middleware_fn(|op, foundry, input, next, cancel| {
            let name = op.name().to_string();
            Box::pin(async move {
                let started = Instant::now();
                let result = next.run(foundry, input, cancel).await;
                println!("[timing] {name} took {:?}", started.elapsed());
                result
            })
        })))
        .expect("foundry is not executing yet");

    // 2. A gate that rejects "greet" inputs missing an "auth" field.
    foundry
        .add_middleware(Arc::new(middleware_fn(|op, foundry, input, next, cancel| {
            Box::pin(async move {
                if op.name() == "greet" && input.get("auth").is_none() {
                    return Err(OperationError::Failed(format!(
                        "operation '{}' requires an auth field",
                        op.name()
                    )));
                }
                next.run(foundry, input, cancel).await
            })
        })))
        .expect("foundry is not executing yet");

    let workflow = Arc::new(
        WorkflowBuilder::new("guarded")
            .operation_fn("greet", |input, _, _| {
                Box::pin(async move {
                    let who = input
                        .get("who")
                        .and_then(|v| v.as_str())
                        .unwrap_or("world");
                    Ok(json!(format!("hello {who}")))
                })
            })
            .build()
            .expect("workflow is well-formed"),
    );

    let smith = Smith::new();
    let cancel = CancellationToken::new();

    // 3. Without auth the gate short-circuits into a failure.
    match smith.execute_with(&workflow, &foundry, &cancel).await {
        Ok(output) => println!("[run 1] ok: {output}"),
        Err(e) => println!("[run 1] rejected: {e}"),
    }

    // 4. Seed the input through a first operation that carries auth.
    let authed = Arc::new(
        WorkflowBuilder::new("guarded-authed")
            .operation_fn("attach-auth", |_, _, _| {
                Box::pin(async { Ok(json!({"auth": "token-1", "who": "forge"})) })
            })
            .operation_fn("greet", |input, _, _| {
                Box::pin(async move {
                    let who = input
                        .get("who")
                        .and_then(|v| v.as_str())
                        .unwrap_or("world");
                    Ok(json!(format!("hello {who}")))
                })
            })
            .build()
            .expect("workflow is well-formed"),
    );

    match smith.execute_with(&authed, &foundry, &cancel).await {
        Ok(output) => println!("[run 2] ok: {output}"),
        Err(e) => println!("[run 2] rejected: {e}"),
    }
}
