//! Saga example: a booking workflow where the last step fails and the
//! completed steps are compensated in reverse order.
//!
//! Run with: cargo run --example saga -p forge-engine

use forge_core::{OperationError, WorkflowBuilder};
use forge_engine::{Smith, TracingLogger};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    // 1. Three steps: reserve a room, charge the card, send the
    //    confirmation. Sending fails, so the charge and the reservation
    //    are rolled back, newest first.
    let workflow = Arc::new(
        WorkflowBuilder::new("book-stay")
            .version("1.2.0")
            .compensable_fn(
                "reserve-room",
                |_, _, _| {
                    Box::pin(async {
                        println!("[saga] reserved room 204");
                        Ok(json!({"room": 204}))
                    })
                },
                |output, _, _| {
                    Box::pin(async move {
                        println!("[saga] released {output}");
                        Ok(())
                    })
                },
            )
            .compensable_fn(
                "charge-card",
                |input, _, _| {
                    Box::pin(async move {
                        println!("[saga] charged 120.00 for {input}");
                        Ok(json!({"charge": "ch-1"}))
                    })
                },
                |output, _, _| {
                    Box::pin(async move {
                        println!("[saga] refunded {output}");
                        Ok(())
                    })
                },
            )
            .operation_fn("send-confirmation", |_, _, _| {
                Box::pin(async {
                    Err(OperationError::Failed("mail gateway down".into()))
                })
            })
            .build()
            .expect("workflow is well-formed"),
    );

    // 2. Execute. The smith creates a context, runs until the failure,
    //    compensates, and raises the triggering error.
    let smith = Smith::new().with_logger(Arc::new(TracingLogger::new()));
    match smith.execute(&workflow, &CancellationToken::new()).await {
        Ok(output) => println!("[saga] unexpected success: {output}"),
        Err(e) => println!("[saga] failed as expected: {e}"),
    }
}
