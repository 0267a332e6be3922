use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use cnn_runner_core::ModelHolder;
use cnn_runner_tract::TractRunner;
use cnn_server::{routes, AppState, Args};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn,actix_web=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let runner_config = args.runner_config()?;
    let image = args.image_spec()?;
    info!("Model: {}", runner_config.model_path.display());
    info!("Input shape: {:?}", runner_config.input_shape);

    let holder = ModelHolder::for_runner::<TractRunner>(runner_config);
    let state = web::Data::new(AppState::new(holder, image));

    if args.preload {
        let preload = state.clone();
        web::block(move || preload.holder.get_model().map(|_| ()))
            .await?
            .context("Failed to preload model")?;
    }

    let max_body_bytes = args.max_body_bytes;
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .configure(routes)
    });
    if let Some(workers) = args.workers {
        server = server.workers(workers);
    }

    info!("Listening on http://{}:{}", args.host, args.port);
    server.bind((args.host.as_str(), args.port))?.run().await?;
    Ok(())
}
