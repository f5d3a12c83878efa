use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use turtle_attack::metrics::{self, MetricsHandler};
use turtle_attack::telemetry::{AsyncEventHandler, ConnectionTally, TracingHandler};
use turtle_attack::Attack;
use turtle_common::Config;

const DEFAULT_CONFIG_PATH: &str = "config/turtle.yaml";
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Production structured logging initialized (JSON)");
}

async fn metrics_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(metrics::render_metrics()))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn run_metrics_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics::register_metrics();

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(metrics_handler)) });

    let server = Server::bind(&addr).serve(make_svc);

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

async fn report_progress(tally: Arc<ConnectionTally>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let snapshot = tally.snapshot();
        for failure in &snapshot.failures {
            debug!(failure = %failure, "Worker failure");
        }
        info!(
            dialed = snapshot.dialed,
            closed = snapshot.closed,
            open = snapshot.dialed.saturating_sub(snapshot.closed),
            connected_ratio = snapshot.connected_ratio(),
            failures = snapshot.failures.len(),
            slots = tally.active_slots(),
            "Attack progress"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let config_path =
        std::env::var("TURTLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config_data = fs::read_to_string(&config_path)?;
    let config: Config = serde_yaml::from_str(&config_data)?;

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            run_metrics_server(port).await;
        });
    }

    let tally = Arc::new(ConnectionTally::new());
    let events = Arc::new(AsyncEventHandler::new(
        ((MetricsHandler, TracingHandler), Arc::clone(&tally)),
        config.telemetry.queue_capacity,
    ));
    let mut attack = Attack::from_config(&config, events)?;

    let master_token = CancellationToken::new();
    tokio::spawn(report_progress(tally, master_token.clone()));

    let signal_token = master_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    info!(attack = attack.name(), config = %config_path, "Turtle started");
    attack.run(master_token.clone()).await?;
    master_token.cancel();

    info!(attack = attack.name(), "Turtle finished");
    Ok(())
}
