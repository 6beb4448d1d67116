#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use args::Args;
use clap::Parser;
use tars_config::Config;
use tars_llm::{ChatRequest, Gateway, LlmResponse, Message, StreamEvent};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    tars_telemetry::init(&config.telemetry, "info")?;

    let gateway = Gateway::new(&config.llm)?;
    tracing::info!(
        config_path = %args.config.display(),
        provider = gateway.provider_name(),
        vendor = %gateway.vendor(),
        model = %args.model,
        "starting tars"
    );

    let mut request = ChatRequest::new(&args.model, args.max_tokens)
        .with_system(&args.system)
        .with_message(Message::user(&args.prompt));
    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let response = if args.stream {
        stream(&gateway, request, &shutdown).await?
    } else {
        tokio::select! {
            () = shutdown.cancelled() => None,
            response = gateway.create(request) => {
                let response = response?;
                println!("{}", response.text());
                Some(response)
            }
        }
    };

    let Some(response) = response else {
        tracing::info!("request cancelled");
        return Ok(());
    };

    for call in response.tool_calls() {
        println!("tool call {} {}: {}", call.id, call.name, serde_json::Value::Object(call.arguments.clone()));
    }

    let usage = response.usage();
    tracing::info!(
        stop_reason = ?response.stop_reason(),
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "completion finished"
    );

    Ok(())
}

/// Print deltas as they arrive; `None` if interrupted
async fn stream(
    gateway: &Gateway,
    request: ChatRequest,
    shutdown: &CancellationToken,
) -> anyhow::Result<Option<LlmResponse>> {
    let mut session = tokio::select! {
        () = shutdown.cancelled() => return Ok(None),
        session = gateway.stream(request) => session?,
    };

    let mut stdout = std::io::stdout();
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return Ok(None),
            event = session.next() => event,
        };

        match event {
            Some(Ok(StreamEvent::TextDelta(text))) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            Some(Err(e)) => return Err(e.into()),
            None => break,
        }
    }
    println!();

    Ok(Some(session.finish().await?))
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
