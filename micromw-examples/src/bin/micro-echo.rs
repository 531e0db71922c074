use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use micromw::prelude::*;
use micromw::{BoxFuture, CompressionLevel, micromw_core::HEADER_ACCEPT_ENCODING};

// Micro middleware: prefix every successful reply
fn greeting_middleware(next: MicroHandler) -> MicroHandler {
    Arc::new(
        move |req: MicroRequest| -> BoxFuture<'static, Result<MicroReply, HandlerError>> {
            let next = next.clone();
            Box::pin(async move {
                let mut reply = next(req).await?;
                let mut data = b"Hello from middleware: ".to_vec();
                data.extend_from_slice(&reply.data);
                reply.data = Bytes::from(data);
                Ok::<_, HandlerError>(reply)
            })
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let substrate = MemoryService::new(
        ServiceConfig::new("MicroEchoService", "1.0.0").description("Echo with micro middleware"),
    );
    let service = Service::new(substrate.clone())
        .with_micro_middleware(CompressionMiddleware::with_level(CompressionLevel::Best))
        .with_micro_middleware(from_fn(greeting_middleware));

    let echo = micro_handler_fn(|req: MicroRequest| async move {
        if req.data.is_empty() {
            return Err(HandlerError::bad_request("empty payload"));
        }
        Ok(MicroReply::new(req.data))
    });
    let svc = service.add_group("svc");
    svc.add_micro_endpoint("echo", echo, EndpointOptions::new())?;

    let reply = substrate
        .request("svc.echo", Headers::new(), "world", Duration::from_secs(1))
        .await?;
    println!("plain: {}", String::from_utf8_lossy(&reply.data));

    // Large enough to cross the compression threshold
    let mut headers = Headers::new();
    headers.set(HEADER_ACCEPT_ENCODING, "gzip");
    let reply = substrate
        .request("svc.echo", headers, "x".repeat(4096), Duration::from_secs(1))
        .await?;
    println!(
        "compressed: encoding={:?} size={}",
        reply.headers.get("encoding"),
        reply.data.len()
    );

    let reply = substrate
        .request("svc.echo", Headers::new(), Bytes::new(), Duration::from_secs(1))
        .await?;
    println!(
        "error: code={:?} description={:?} body={}",
        reply.error_code(),
        reply.error_description(),
        String::from_utf8_lossy(&reply.data)
    );

    for endpoint in service.stats().endpoints {
        println!(
            "{}: requests={} errors={}",
            endpoint.subject, endpoint.num_requests, endpoint.num_errors
        );
    }
    Ok(())
}
