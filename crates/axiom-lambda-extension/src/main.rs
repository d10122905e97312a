// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use axiom_lambda_extension::{
    config::{Config, ConfigError},
    error::ExtensionError,
    extension::{
        client::{RuntimeApiClient, SubscribeRequest},
        coordinator::{run_without_lifecycle, LifecycleCoordinator},
        runtime_done::RuntimeDoneSignal,
    },
    log_build_info, logger,
    logs::{
        constants::{intake_body_limit, INTAKE_BIND_HOST},
        flusher::FlushEngine,
        intake::{IntakeHandler, LogIntakeServer},
        normalizer::EventNormalizer,
        sink::build_sink,
    },
};

#[derive(Debug, Parser)]
#[command(name = "axiom-lambda-extension", version, about)]
struct Cli {
    /// Run only the log intake server, without the Extensions API.
    #[arg(long, env = "AXIOM_DEVELOPMENT_MODE")]
    development_mode: bool,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    config.development_mode = cli.development_mode;

    if let Err(e) = logger::init(&config.log_level) {
        // Retry with the default level so the validation error below is visible.
        if logger::init("info").is_err() {
            eprintln!("AXIOM_EXTENSION | ERROR | {e}");
        }
    }
    log_build_info();

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), ExtensionError> {
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let flusher = Arc::new(FlushEngine::new(
        build_sink(&config),
        config.flush_max_items,
        config.flush_interval,
    ));
    let runtime_done = Arc::new(RuntimeDoneSignal::new());
    let handler = IntakeHandler::new(
        Arc::new(EventNormalizer::new(config.function.clone())),
        flusher.clone(),
        runtime_done.clone(),
    )
    .with_max_body_bytes(intake_body_limit(config.buffering.max_bytes));

    let server = LogIntakeServer::bind(
        SocketAddr::from((INTAKE_BIND_HOST, config.logs_port)),
        handler,
    )
    .await?;
    info!("INTAKE | Listening on {}", server.local_addr()?);
    let server_task = tokio::spawn(server.serve(cancel.clone()));

    let result = if config.development_mode {
        run_without_lifecycle(flusher, config.flush_interval, cancel.clone()).await;
        Ok(())
    } else {
        let runtime_api = config
            .runtime_api
            .as_deref()
            .ok_or(ConfigError::MissingRuntimeApi)?;
        let control_plane = RuntimeApiClient::new(runtime_api, &config.extension_name)
            .map_err(ExtensionError::Registration)?;

        LifecycleCoordinator::new(
            Arc::new(control_plane),
            flusher,
            runtime_done,
            SubscribeRequest::new(config.buffering, config.logs_port),
            config.runtime_done_timeout,
            cancel.clone(),
        )
        .run()
        .await
    };

    cancel.cancel();
    match server_task.await {
        Ok(Err(e)) => error!("INTAKE | Server stopped with an error: {e}"),
        Err(e) => error!("INTAKE | Server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    result
}

async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            () = cancel.cancelled() => return,
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            () = cancel.cancelled() => return,
        }
    }

    cancel.cancel();
}
