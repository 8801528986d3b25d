use std::io;

use actix_web::web;
use dotenvy::dotenv;
use storefront_service::{build_server, create_pool, run_migrations, AppConfig, AppState};

fn startup_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(startup_error)?;

    let pool = create_pool(&config.database_url, config.db_pool_size).map_err(startup_error)?;
    run_migrations(&pool).map_err(startup_error)?;

    let state = web::Data::new(AppState::new(pool, config.reservation_policy()));

    log::info!(
        "Starting server at http://{}:{} (cart holds {}h)",
        config.host,
        config.port,
        config.reservation_hours
    );

    build_server(state, &config.host, config.port)?.await
}
