use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use micromw::prelude::*;
use micromw::{BoxFuture, MetricsMiddleware};

// Plain middleware: log how long the rest of the chain took
fn duration_middleware(next: Handler) -> Handler {
    Arc::new(move |msg: Message| -> BoxFuture<'static, ()> {
        let next = next.clone();
        Box::pin(async move {
            let start = Instant::now();
            let subject = msg.subject().to_string();
            next(msg).await;
            tracing::info!(%subject, elapsed = ?start.elapsed(), "handled");
        })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let substrate = MemoryService::new(ServiceConfig::new("EchoService", "1.0.0"));
    let chain = MiddlewareChain::<Handler>::new().with(from_fn(duration_middleware));
    let service =
        Service::with_chain(substrate.clone(), chain).use_middleware(MetricsMiddleware::new());

    let echo = handler_fn(|msg: Message| async move {
        if let Err(err) = msg.respond(msg.data().clone(), Headers::new()) {
            tracing::warn!(error = %err, "reply failed");
        }
    });
    service.add_endpoint("echo", echo, EndpointOptions::new().subject("svc.echo"))?;

    for payload in ["hello", "world"] {
        let reply = substrate
            .request("svc.echo", Headers::new(), Bytes::from(payload), Duration::from_secs(1))
            .await?;
        println!("svc.echo -> {}", String::from_utf8_lossy(&reply.data));
    }

    service.stop()?;
    Ok(())
}
