mod alert;
mod api;
mod dashboard;
mod database;
mod error;
mod filter;
mod identity;
mod inquiry;
mod listing;
mod pagination;
mod profile;
mod query;
mod review;
mod settings;
mod web;

use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    database::Database,
    settings::{Args, Settings},
    web::Ctx,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.filter));
    match filter {
        Ok(filter) => fmt().with_env_filter(filter).init(),
        Err(error) => {
            eprintln!("Problem while parsing the log filter. {error}");
            exit(1);
        }
    }

    if let Err(error) = run(args, settings).await {
        error!("{error:#}");
        exit(1);
    }
}

async fn run(args: Args, settings: Settings) -> Result<()> {
    info!("Estate Listing Server {}", env!("CARGO_PKG_VERSION"));
    let db = Database::connect(&settings.database.path)?;
    info!("database opened at {}", settings.database.path.display());

    let schema = api::schema(db.clone());
    let ctx = Ctx::new(db.clone(), settings.web.request_timeout());
    let tls = match (&args.cert, &args.key) {
        (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
        _ => None,
    };
    web::serve(ctx, schema, settings.web.address, tls, shutdown_signal()).await?;

    db.flush().context("cannot flush database")?;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = ctrl_c().await {
            error!("cannot listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down");
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(error) => {
                error!("cannot listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}
