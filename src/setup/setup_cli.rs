use bcrypt::{hash, DEFAULT_COST};
use clap::{Parser, Subcommand};
use commons_backend::config::Config;
use commons_backend::helper::ingest_helpers::ANNOUNCEMENT_IMAGE_KEY;
use commons_backend::models::db_operations::profiles_db_operations;
use commons_backend::setup::db_setup;
use redb::Database;
use rusqlite::{params, Connection};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    Assets {
        #[command(subcommand)]
        action: AssetAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum AssetAction {
    /// Registers the stock image attached to ingested announcements.
    SetAnnouncementImage {
        #[arg(long)]
        storage_path: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("community") => setup_community_database(&config),
                Some("posts") => setup_posts_database(&config),
                Some(other) => eprintln!(
                    "Error: Unknown database type '{}'. Use 'community' or 'posts'.",
                    other
                ),
                None => {
                    setup_community_database(&config);
                    setup_posts_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { username, password } => {
                create_admin_user(&config, username, password);
            }
            AdminAction::List => {
                list_admin_users(&config);
            }
            AdminAction::ChangePassword {
                username,
                new_password,
            } => {
                change_admin_password(&config, username, new_password);
            }
        },
        Commands::Assets { action } => match action {
            AssetAction::SetAnnouncementImage { storage_path } => {
                set_announcement_image(&config, storage_path);
            }
        },
    }
}

fn setup_community_database(config: &Config) {
    let db_path = config.community_db_path();
    if db_path.exists() {
        println!(
            "Community database already exists at '{}'. Skipping creation.",
            db_path.display()
        );
        return;
    }
    println!("\nSetting up community database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create community database file.");
    match db_setup::setup_community_db(&mut conn) {
        Ok(_) => println!("Community database setup completed successfully."),
        Err(e) => eprintln!("Error setting up community database: {}", e),
    }
}

fn setup_posts_database(config: &Config) {
    let db_path = config.posts_db_path();
    if db_path.exists() {
        println!(
            "Posts database already exists at '{}'. Skipping creation.",
            db_path.display()
        );
        return;
    }
    println!("\nSetting up posts database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let db = Database::create(&db_path).expect("Failed to create posts database file.");
    match db_setup::setup_posts_db(&db) {
        Ok(_) => println!("Posts database setup completed successfully."),
        Err(e) => eprintln!("Error setting up posts database: {}", e),
    }
}

fn open_community_db(config: &Config) -> Option<Connection> {
    let db_path = config.community_db_path();
    if !db_path.exists() {
        eprintln!(
            "Error: Community database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    Connection::open(&db_path)
        .map_err(|e| eprintln!("Error opening community database: {}", e))
        .ok()
}

fn create_admin_user(config: &Config, username: &str, password: &str) {
    let Some(conn) = open_community_db(config) else {
        return;
    };
    let hashed_password = hash(password, DEFAULT_COST).expect("Failed to hash password");

    match conn.execute(
        "INSERT INTO profiles (username, password_hash, role) VALUES (?1, ?2, 'admin')",
        params![username, hashed_password],
    ) {
        Ok(_) => println!("Admin user '{}' created successfully.", username),
        Err(e) => eprintln!(
            "Error creating admin user: {}. It might be because the username already exists.",
            e
        ),
    }
}

fn list_admin_users(config: &Config) {
    let Some(conn) = open_community_db(config) else {
        return;
    };
    let mut stmt =
        match conn.prepare("SELECT username FROM profiles WHERE role = 'admin' ORDER BY username") {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error preparing database query: {}", e);
                return;
            }
        };
    let user_iter = stmt.query_map([], |row| row.get(0));

    println!("Listing admin users:");
    match user_iter {
        Ok(users) => {
            for user in users {
                println!("- {}", user.unwrap_or_else(|_| "Invalid username".to_string()));
            }
        }
        Err(e) => eprintln!("Error fetching admins: {}", e),
    }
}

fn change_admin_password(config: &Config, username: &str, new_password: &str) {
    let Some(conn) = open_community_db(config) else {
        return;
    };
    let hashed_password = hash(new_password, DEFAULT_COST).expect("Failed to hash new password");
    match conn.execute(
        "UPDATE profiles SET password_hash = ?1 WHERE username = ?2 AND role = 'admin'",
        params![hashed_password, username],
    ) {
        Ok(0) => eprintln!("Error: No admin user named '{}' found.", username),
        Ok(_) => println!("Password for admin user '{}' changed successfully.", username),
        Err(e) => eprintln!("Error updating password: {}", e),
    }
}

fn set_announcement_image(config: &Config, storage_path: &str) {
    let Some(conn) = open_community_db(config) else {
        return;
    };
    match profiles_db_operations::add_image_asset(
        &conn,
        storage_path,
        Some(ANNOUNCEMENT_IMAGE_KEY),
    ) {
        Ok(asset) => println!(
            "Announcement image registered as asset {} ({}).",
            asset.id, asset.storage_path
        ),
        Err(e) => eprintln!("Error registering announcement image: {}", e),
    }
}
