use actix_cors::Cors;
use actix_session::{storage::CookieSessionStore, SessionExt, SessionMiddleware};
use actix_web::{
    cookie::Key,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use clap::Parser;
use commons_backend::{
    config::Config,
    helper::diagnostics_helpers::{DiagnosticsLog, DEFAULT_DIAGNOSTICS_CAPACITY},
    helper::feed_helpers::FeedQuery,
    helper::public_helpers,
    middleware::admin_guard,
    routes,
    sync::{ChangeHub, LiveFeed, WatchedTable},
    AppState, DbPool,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;
use std::convert::TryFrom;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// A simple handler for the root URL.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "commons_server", author, version, about = "Starts the community association web server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

const LIVE_FEED_PAGE_SIZE: usize = 20;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load configuration first, then wire the logger from it.
    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(&config.database_path).expect("Failed to create database directory");

    let redb_db_data = web::Data::new(Database::open(config.posts_db_path()).expect(
        "FATAL: posts.db not found. Run 'cargo run --bin setup_cli -- --env-file <path> db setup'",
    ));

    let manager = SqliteConnectionManager::file(config.community_db_path());
    let pool: DbPool = Pool::builder()
        .build(manager)
        .expect("FATAL: Failed to create Rusqlite connection pool.");

    let changes = ChangeHub::new();

    // The home feed watcher: any insert/update/delete on either table
    // triggers a full re-aggregation into the shared snapshot.
    let live_feed = {
        let subscription = changes.subscribe(&[WatchedTable::Events, WatchedTable::ContentPosts]);
        let db = redb_db_data.clone();
        let pool = pool.clone();
        LiveFeed::spawn(subscription, move || {
            let query = FeedQuery {
                category: None,
                page: 0,
                page_size: LIVE_FEED_PAGE_SIZE,
                today: Utc::now().date_naive(),
            };
            public_helpers::fetch_feed(&db, &pool, &query)
        })
    };

    let app_state = web::Data::new(AppState {
        diagnostics: Arc::new(DiagnosticsLog::new(DEFAULT_DIAGNOSTICS_CAPACITY)),
        changes,
        live_feed,
    });

    let session_key_bytes = hex::decode(&config.session_secret_key)
        .expect("FATAL: SESSION_SECRET_KEY in .env is not a valid hex string.");
    let session_key = Key::try_from(session_key_bytes.as_slice())
        .expect("FATAL: The decoded SESSION_SECRET_KEY is not long enough (minimum 64 bytes required).");

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    println!("Server starting at http://{}", server_address);

    HttpServer::new(move || {
        let session_mw =
            SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                .cookie_secure(config.use_secure_cookies)
                .cookie_http_only(true)
                .cookie_same_site(actix_web::cookie::SameSite::Lax)
                .build();

        // Configurable CORS for the public API; the ingest scope carries
        // its own open policy.
        let cors = {
            let allowed_origins_str = &config.allowed_origins;
            if allowed_origins_str.trim() == "*" {
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600)
            } else {
                let mut cors = Cors::default();
                let origins: Vec<&str> = allowed_origins_str
                    .split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                for origin in origins {
                    cors = cors.allowed_origin(origin);
                }
                cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .supports_credentials()
                    .max_age(3600)
            }
        };

        let admin_url_prefix = config.admin_url_prefix.clone();

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .app_data(web::Data::new(config.clone()))
            .app_data(redb_db_data.clone())
            .app_data(web::Data::new(pool.clone()))
            .app_data(app_state.clone())
            .configure(routes::public::config_api)
            .configure(routes::ingest::config_ingest)
            .service(actix_files::Files::new("/media", &config.media_path))
            .route("/", web::get().to(root_handler))
            // Session management applies to the admin surface only.
            .service(
                web::scope("/management").wrap(session_mw).service(
                    web::scope(&admin_url_prefix)
                        .configure(routes::admin::config_login)
                        .service(
                            web::scope("")
                                .guard(actix_web::guard::fn_guard(|ctx| {
                                    admin_guard(&ctx.get_session())
                                }))
                                .configure(routes::admin::config_dashboard),
                        ),
                ),
            )
    })
    .bind(server_address)?
    .run()
    .await
}
