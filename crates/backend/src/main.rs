mod retention;

use common::config;
use logging::*;
use persistence::Store;
use std::sync::Arc;
use web::AppState;

type Result<T> = anyhow::Result<T>;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() {
    let log = DEFAULT.new(o!("function" => "main"));
    info!(log, "Starting up");

    if let Err(e) = run().await {
        crit!(log, "shutting down"; "error" => format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let store = Store::from_config()?;
    let state = Arc::new(AppState::from_config(store.clone()));

    tokio::spawn(retention::run(store));

    let addr = config::get("SERVER_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    tokio::select! {
        result = web::serve(&addr, state) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
