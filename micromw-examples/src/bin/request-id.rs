use std::time::Duration;

use bytes::Bytes;
use micromw::TracingMiddleware;
use micromw::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let substrate = MemoryService::new(ServiceConfig::new("RequestIdService", "1.0.0"));
    let service = Service::new(substrate.clone())
        .with_context_middleware(RequestIdMiddleware::new())
        .with_context_middleware(TracingMiddleware::new());

    let whoami = context_handler_fn(|req: Request| async move {
        let id = RequestId::from_context(req.context()).unwrap_or_default();
        tracing::info!(request_id = %id, "handling request");
        req.respond(format!("request id: {id}"))?;
        Ok(())
    });
    service.add_context_endpoint("whoami", whoami, EndpointOptions::new())?;

    let mut headers = Headers::new();
    headers.set("request_id", "req-42");
    let reply = substrate
        .request("whoami", headers, Bytes::new(), Duration::from_secs(1))
        .await?;
    println!("{}", String::from_utf8_lossy(&reply.data));

    // No header: an id is generated
    let reply = substrate
        .request("whoami", Headers::new(), Bytes::new(), Duration::from_secs(1))
        .await?;
    println!("{}", String::from_utf8_lossy(&reply.data));
    Ok(())
}
