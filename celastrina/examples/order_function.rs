//! End-to-end wiring of a function against the in-memory envelope.
//!
//! Run with `cargo run --example order_function`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use celastrina::prelude::*;

struct OrderFunction;

impl Function for OrderFunction {
    fn validate<'a>(
        &'a self,
        context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        let result = match context.binding("order") {
            Some(_) => Ok(()),
            None => Err(CelastrinaError::validation(
                "an order binding is required",
                "order",
            )),
        };
        Box::pin(std::future::ready(result))
    }

    fn process<'a>(
        &'a self,
        context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            let order = context.binding("order").unwrap_or_default();
            context.log(LogLevel::Info, "processing order");
            context.set_binding("receipt", serde_json::json!({"accepted": order}));
            context.set_result(serde_json::json!({"status": "accepted"}));
            Ok(())
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), CelastrinaError> {
    celastrina::init_tracing();

    let mut configuration = Configuration::new("orders")?;
    configuration
        .set_bootstrap(BootstrapConfig::from_env())
        .add_permission(Permission::new("process", ["submitter"], ValueMatch::Any)?)
        .add_authenticator(Box::new(
            OpenAuthenticator::new().with_assignments(["submitter"]),
        ));
    let configuration = Arc::new(configuration);

    let envelope = Arc::new(
        LocalEnvelope::new().with_binding("order", serde_json::json!({"sku": "A-1", "qty": 2})),
    );
    LifecycleRunner::run(configuration, &OrderFunction, envelope.clone()).await;

    println!("completed: {:?}", envelope.result());
    println!("receipt:   {:?}", envelope.binding("receipt"));
    Ok(())
}
