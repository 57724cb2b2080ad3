use actix_cors::Cors;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    cookie::{Key, SameSite},
    http::header,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use clap::Parser;
use redb::Database;
use scribe_backend::{
    build_pool,
    config::Config,
    helper::notification_helpers::{DbNotificationSink, NotificationSink},
    routes,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "scribe_server", author, version, about = "Starts the Scribe editorial API server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(&config.database_path).expect("Failed to create database directory");

    let sqlite_path = config.sqlite_db_path();
    if !sqlite_path.exists() {
        panic!(
            "FATAL: {} not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
            sqlite_path.display()
        );
    }
    let pool = build_pool(&sqlite_path).expect("FATAL: Failed to create Rusqlite connection pool.");

    let views_db = web::Data::new(
        Database::open(config.views_db_path())
            .expect("FATAL: views.redb not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'"),
    );

    let sink: Arc<dyn NotificationSink> = Arc::new(DbNotificationSink::new(pool.clone()));
    let sink_data: web::Data<dyn NotificationSink> = web::Data::from(sink);

    let session_key_bytes =
        hex::decode(&config.session_secret_key).expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw = SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
            .cookie_secure(config.use_secure_cookies)
            .cookie_http_only(true)
            .cookie_same_site(SameSite::Lax)
            .build();

        App::new()
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(views_db.clone())
            .app_data(sink_data.clone())
            .configure(routes::public::config_api)
            .service(
                web::scope("/management/api")
                    .wrap(session_mw)
                    .configure(routes::admin::config_api)
                    .configure(routes::staff::config_api),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
