use clap::{Parser, Subcommand};
use redb::Database;
use rusqlite::Connection;
use scribe_backend::build_pool;
use scribe_backend::config::Config;
use scribe_backend::helper::public_helpers::{self, Registration};
use scribe_backend::helper::admin_helpers;
use scribe_backend::models::db_operations::users_db_operations;
use scribe_backend::models::{Caller, Role};
use scribe_backend::setup::db_setup;
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
    Invite {
        #[command(subcommand)]
        action: InviteAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the SQLite and Redb files. `sqlite` or `views` limits it to one.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Creates the master administrator. Only works on an empty database.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        display_name: String,
        #[arg(long)]
        password: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum InviteAction {
    /// Issues an invite on behalf of the master administrator.
    Create {
        #[arg(long)]
        expires_in_days: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file).expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("sqlite") => setup_sqlite_database(&config),
                Some("views") => setup_views_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'sqlite' or 'views'.", other),
                None => {
                    setup_sqlite_database(&config);
                    setup_views_database(&config);
                }
            },
        },
        Commands::Admin { action } => match action {
            AdminAction::Create { email, display_name, password } => {
                create_master_admin(&config, email, display_name, password);
            }
            AdminAction::List => list_admin_users(&config),
        },
        Commands::Invite { action } => match action {
            InviteAction::Create { expires_in_days } => create_invite(&config, *expires_in_days),
        },
    }
}

fn setup_sqlite_database(config: &Config) {
    let db_path = config.sqlite_db_path();
    println!("\nSetting up SQLite database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let mut conn = Connection::open(&db_path).expect("Could not create SQLite database file.");
    match db_setup::setup_sqlite_db(&mut conn) {
        Ok(_) => println!("✅ SQLite database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up SQLite database: {}", e),
    }
}

fn setup_views_database(config: &Config) {
    let db_path = config.views_db_path();
    if db_path.exists() {
        println!("ℹ️ Views database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up views database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        fs::create_dir_all(parent_dir).expect("Could not create database directory.");
    }

    let db = Database::create(&db_path).expect("Failed to create views database file.");
    match db_setup::setup_views_db(&db) {
        Ok(_) => println!("✅ Views database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up views database: {}", e),
    }
}

fn open_pool(config: &Config) -> Option<scribe_backend::DbPool> {
    let db_path = config.sqlite_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: SQLite database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match build_pool(&db_path) {
        Ok(pool) => Some(pool),
        Err(e) => {
            eprintln!("❌ Error opening SQLite database: {}", e);
            None
        }
    }
}

fn create_master_admin(config: &Config, email: &str, display_name: &str, password: &str) {
    let Some(pool) = open_pool(config) else { return };

    match pool.get().map(|conn| users_db_operations::count_users(&conn)) {
        Ok(Ok(0)) => {}
        Ok(Ok(_)) => {
            eprintln!("❌ Error: Users already exist. Further accounts must sign up with an invite.");
            return;
        }
        Ok(Err(e)) => {
            eprintln!("❌ Error counting users: {}", e);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error opening connection: {}", e);
            return;
        }
    }

    let registration = Registration { email, display_name, password, invite_code: None };
    match public_helpers::register_user(&pool, registration, config.bcrypt_cost) {
        Ok(user) => println!("✅ Master administrator '{}' created with id {}.", user.email, user.id),
        Err(e) => eprintln!("❌ Error creating administrator: {}", e),
    }
}

fn list_admin_users(config: &Config) {
    let Some(pool) = open_pool(config) else { return };
    let users = match pool.get().map(|conn| users_db_operations::read_all_users(&conn)) {
        Ok(Ok(users)) => users,
        Ok(Err(e)) => {
            eprintln!("❌ Error fetching admins: {}", e);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error opening connection: {}", e);
            return;
        }
    };

    println!("Listing Admin Users:");
    for user in users.iter().filter(|u| u.role == Role::Admin) {
        let mut flags = Vec::new();
        if user.is_master {
            flags.push("master");
        }
        if user.suspended {
            flags.push("suspended");
        }
        if flags.is_empty() {
            println!("- {} <{}>", user.display_name, user.email);
        } else {
            println!("- {} <{}> [{}]", user.display_name, user.email, flags.join(", "));
        }
    }
}

fn create_invite(config: &Config, expires_in_days: Option<u32>) {
    let Some(pool) = open_pool(config) else { return };
    let master = match pool.get().map(|conn| users_db_operations::read_all_users(&conn)) {
        Ok(Ok(users)) => users.into_iter().find(|u| u.is_master),
        Ok(Err(e)) => {
            eprintln!("❌ Error fetching users: {}", e);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error opening connection: {}", e);
            return;
        }
    };
    let Some(master) = master else {
        eprintln!("❌ Error: No master administrator exists yet. Run `setup_cli admin create` first.");
        return;
    };

    match admin_helpers::create_invite(&pool, &Caller::from(&master), expires_in_days) {
        Ok(invite) => match invite.expires_at {
            Some(at) => println!("✅ Invite code: {} (expires {})", invite.code, at.to_rfc3339()),
            None => println!("✅ Invite code: {}", invite.code),
        },
        Err(e) => eprintln!("❌ Error creating invite: {}", e),
    }
}
