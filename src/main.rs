#[macro_use]
extern crate log;

use sqs_mail_worker::config::{Cli, Config};
use sqs_mail_worker::errors::ProcessorError;
use sqs_mail_worker::processor::{install_panic_hook, DrainOutcome, Processor};
use sqs_mail_worker::s3::S3Store;
use sqs_mail_worker::sqs::SqsQueue;
use sqs_mail_worker::work::MessageWorker;
use std::process;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Cli::new().build_config() {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };
    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not build the tokio runtime: {}", e);
            process::exit(1);
        }
    };

    let result = runtime.block_on(run(config));
    // Abandoned tasks must not hold up the exit
    runtime.shutdown_background();

    match result {
        Ok(DrainOutcome::Clean) => info!("SQS worker stopped"),
        Ok(DrainOutcome::Forced { abandoned }) => {
            info!("SQS worker stopped, {} message(s) left for redelivery", abandoned)
        }
        Err(e) => exit_with(e),
    }
}

fn build_runtime() -> std::io::Result<Runtime> {
    Builder::new_multi_thread()
        .thread_name("sqs-mail-worker")
        .thread_stack_size(3 * 1024 * 1024)
        .enable_all()
        .build()
}

async fn run(config: Config) -> Result<DrainOutcome, ProcessorError> {
    info!("Initializing sqs-mail-worker: {:?}", &config.mode);
    info!("Queue URL: {}", &config.queue_url);
    info!("S3 Bucket: {}", &config.bucket);
    info!(
        "Polling interval: {:?}, max messages per poll: {}",
        &config.poll_interval, config.max_messages
    );

    let queue = Arc::new(SqsQueue::from_mode(&config.mode, &config.queue_url)?);
    let store = Arc::new(S3Store::from_mode(&config.mode, &config.bucket)?);
    let processor = Processor::new(MessageWorker::from_config(queue, store, &config), &config);

    let shutdown = CancellationToken::new();
    install_panic_hook(shutdown.clone());
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    Ok(processor.run(shutdown).await)
}

#[cfg(unix)]
async fn cancel_on_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
                _ = terminate.recv() => info!("Received SIGTERM, shutting down gracefully"),
            }
        }
        Err(e) => {
            warn!("Could not listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received SIGINT, shutting down gracefully");
        }
    }
    shutdown.cancel();
}

#[cfg(not(unix))]
async fn cancel_on_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received interrupt, shutting down gracefully");
    shutdown.cancel();
}

fn exit_with(e: ProcessorError) -> ! {
    error!("{}", e);
    eprintln!("{}", e);
    process::exit(1);
}
