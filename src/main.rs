use std::io;
use std::path::PathBuf;

use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, Subcommand};

use foodgram_api::config::Config;
use foodgram_api::db::{self, DbPool};
use foodgram_api::{api, seed};

#[derive(Debug, Parser)]
#[command(name = "foodgram-api", version, about = "Recipe sharing REST API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Load ingredients from a JSON fixture into the catalog.
    LoadIngredients {
        /// Path to a `[{"name", "measurement_unit"}]` file.
        path: PathBuf,
    },
}

async fn serve(config: Config, pool: DbPool) -> io::Result<()> {
    let bind = (config.host.clone(), config.port);
    log::info!("starting HTTP server at http://{}:{}", bind.0, bind.1);

    let config = web::Data::new(config);
    let pool = web::Data::new(pool);
    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(config.clone())
            .wrap(middleware::Logger::default())
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await
}

fn load_ingredients(pool: &DbPool, path: &std::path::Path) -> io::Result<()> {
    let mut conn = pool.get().map_err(io::Error::other)?;
    let report = seed::load_ingredients(&mut conn, path).map_err(|e| {
        log::error!("ingredient loading failed: {e}");
        io::Error::other(e)
    })?;
    println!(
        "Processed {} ingredients, added {}",
        report.processed, report.added
    );
    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let config = Config::load().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // migrations run here, before either command touches the database
    let pool = db::create_pool(&config.database_url).map_err(|e| {
        log::error!("failed to open database {}: {e}", config.database_url);
        io::Error::other(e)
    })?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::LoadIngredients { path } => load_ingredients(&pool, &path),
    }
}
