use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use nimbus::db::AuthTokenRepository;
use nimbus::{Config, Database, NewUser, Role, UserRepository, WebServer};

const USAGE: &str = "usage: nimbus [add-user <username> [--admin]]";

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = nimbus::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        nimbus::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None => serve(&config, db).await,
        Some("add-user") => add_user(&config, &db, &args[1..]).await,
        Some(_) => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: &Config, db: Database) -> nimbus::Result<()> {
    info!("nimbus - personal cloud storage");
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );

    let server = WebServer::new(config, Arc::new(db))?;
    server.run().await?;
    Ok(())
}

/// Create a user with the default quota and print a fresh auth token.
async fn add_user(config: &Config, db: &Database, args: &[String]) -> nimbus::Result<()> {
    let Some(username) = args.first() else {
        eprintln!("{USAGE}");
        return Err(nimbus::NimbusError::Validation(
            "missing username".to_string(),
        ));
    };
    let role = if args.iter().any(|a| a == "--admin") {
        Role::Admin
    } else {
        Role::User
    };

    // Credentials are managed by the login service; none is stored here.
    let new_user =
        NewUser::new(username.as_str(), "", config.storage.default_quota_bytes).with_role(role);
    let user = UserRepository::new(db.pool()).create(&new_user).await?;
    let token = AuthTokenRepository::new(db.pool()).issue(user.id).await?;

    info!(user_id = user.id, role = %user.role, "user created");
    println!("{}", token.token);
    Ok(())
}
