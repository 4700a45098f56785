use std::{io::Write, process, sync::Arc, time::Duration};

use swbundle::{
    application::{
        contributors,
        delivery::{CompiledBundle, WorkerService, etag_matches},
        error::AppError,
    },
    config,
    domain::scope::Scope,
    infra::{
        error::InfraError,
        files::AllowListedFiles,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::{sync::Notify, task::JoinError};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;
    let service = build_worker_service(&settings)?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, service).await,
        config::Command::Compile(args) => run_compile(service, args).await,
    }
}

fn build_worker_service(settings: &config::Settings) -> Result<WorkerService, AppError> {
    let worker = Arc::new(settings.worker.clone());
    let declarations = Arc::new(settings.declarations.clone());
    let files = AllowListedFiles::from_settings(&worker)?;
    let contributors = contributors::builtin(Arc::clone(&worker), declarations);

    Ok(WorkerService::new(
        Arc::new(contributors),
        Arc::new(files),
        worker,
    ))
}

async fn run_serve(settings: &config::Settings, service: WorkerService) -> Result<(), AppError> {
    let router = http::build_router(HttpState::new(service));
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "swbundle::serve",
        addr = %settings.server.addr,
        site_url = %settings.worker.site_url,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { signal.notified().await });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut handle => return server_result(result),
        _ = tokio::signal::ctrl_c() => {
            info!(target = "swbundle::serve", "shutdown requested");
            shutdown.notify_one();
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, handle).await {
        Ok(result) => server_result(result),
        Err(_) => {
            warn!(
                target = "swbundle::serve",
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

fn server_result(result: Result<std::io::Result<()>, JoinError>) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn compile_bounded(
    service: WorkerService,
    scope: Scope,
    limit: Duration,
) -> Result<CompiledBundle, AppError> {
    let task = tokio::task::spawn_blocking(move || service.compile(scope));
    let bundle = tokio::time::timeout(limit, task)
        .await
        .map_err(|_| {
            AppError::unexpected(format!(
                "compilation of the {scope} script exceeded {} ms",
                limit.as_millis()
            ))
        })?
        .map_err(|err| AppError::unexpected(format!("compile task failed: {err}")))??;
    Ok(bundle)
}

async fn run_compile(service: WorkerService, args: config::CompileArgs) -> Result<(), AppError> {
    let scope = args.scope;
    let limit = service.worker().compile_timeout;
    let bundle = compile_bounded(service, scope, limit).await?;

    let etag = bundle.etag();
    eprintln!("ETag: {etag}");
    for diagnostic in &bundle.diagnostics {
        eprintln!("diagnostic: {diagnostic}");
    }
    for handle in &bundle.degraded {
        eprintln!("degraded: {handle}");
    }

    if args
        .if_none_match
        .as_deref()
        .is_some_and(|header| etag_matches(header, &etag))
    {
        eprintln!("not modified");
        return Ok(());
    }

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, bundle.text.as_bytes())
                .await
                .map_err(|err| AppError::from(InfraError::from(err)))?;
            info!(
                target = "swbundle::compile",
                scope = scope.as_str(),
                path = %path.display(),
                "worker script written"
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bundle.text.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|err| AppError::from(InfraError::from(err)))?;
        }
    }

    Ok(())
}
