use clap::Parser;
use kart_rating::{
    args::Args,
    database::db::DbClient,
    error::error_chain,
    messaging::{RabbitMqConfig, RabbitMqPublisher, RatingHistoryRefreshedMessage},
    model::rating_model::PlackettLuceModel,
    pipeline::{self, RunRequest, RunSummary},
    utils::cancellation::CancelFlag
};
use std::process::exit;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level);

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Application cannot start without a valid database connection");
            exit(1);
        }
    };

    if args.init_schema {
        if let Err(e) = client.ensure_schema().await {
            error!("Failed to apply schema: {}", error_chain(&e));
            exit(1);
        }
    }

    let cancel = CancelFlag::new();
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next match");
            signal_flag.cancel();
        }
    });

    let request = RunRequest {
        mode: args.mode,
        player_count: args.player_count
    };
    let model = PlackettLuceModel::default();

    let summary = match pipeline::run(&client, &client, &model, request, &cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Rating run failed: {}", error_chain(&e));
            exit(1);
        }
    };

    if args.publish {
        publish_refresh(&request, &summary).await;
    }

    match serde_json::to_string(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize run summary: {}", e)
    }
}

fn init_tracing(level: &str) {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

/// History is already committed at this point, so failures here are only logged.
async fn publish_refresh(request: &RunRequest, summary: &RunSummary) {
    let config = match RabbitMqConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            warn!("RabbitMQ configuration incomplete, skipping refresh event: {}", e);
            return;
        }
    };

    let mut publisher = match RabbitMqPublisher::connect_from_config(&config).await {
        Ok(publisher) => publisher,
        Err(e) => {
            warn!("Failed to connect to RabbitMQ: {}", e);
            return;
        }
    };

    let message = RatingHistoryRefreshedMessage::new(request.mode, summary, None);
    match publisher.publish(&message).await {
        Ok(()) => info!("Published history refresh event"),
        Err(e) => warn!("Failed to publish history refresh event: {}", e)
    }

    if let Err(e) = publisher.close().await {
        warn!("Failed to close RabbitMQ connection: {}", e);
    }
}
