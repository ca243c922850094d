use std::path::{Path, PathBuf};

use clap::Parser;
use registrar::{
    AppState, build_app,
    config::RegistrarConfig,
    db::DbPool,
    models::{CreateIdentity, ProfileFields, Role},
    observability,
};
use validator::Validate;

const DEFAULT_CONFIG_PATH: &str = "registrar.toml";

/// CLI arguments for Registrar
#[derive(Parser, Debug)]
#[command(version, about = "Role-hierarchical identity and enrollment backend", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Write a starter configuration file
    Init {
        /// Path to create the config file (defaults to ./registrar.toml)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the first ADMIN identity
    BootstrapAdmin {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "System")]
        name: String,
        #[arg(long, default_value = "Administrator")]
        surname: String,
        /// Read from REGISTRAR_ADMIN_PASSWORD when omitted
        #[arg(long, env = "REGISTRAR_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn default_config_toml() -> &'static str {
    r#"# Registrar configuration

[server]
host = "127.0.0.1"
port = 8080

[database]
type = "sqlite"
path = "registrar.db"

[auth]
# At least 32 bytes. Keep it out of version control.
jwt_secret = "${REGISTRAR_JWT_SECRET}"
registration_enabled = true

[pagination]
default_size = 20
max_size = 100

[observability.logging]
level = "info"
format = "compact"
"#
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Migrate) => run_migrate(&args.config).await,
        Some(Command::BootstrapAdmin {
            handle,
            email,
            name,
            surname,
            password,
        }) => {
            let input = CreateIdentity {
                handle,
                password,
                name,
                surname,
                email,
                role: Role::Admin,
                phone: None,
                gender: None,
                birth_date: None,
                profile: ProfileFields::default(),
            };
            run_bootstrap_admin(&args.config, input).await;
        }
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn run_init(output: Option<PathBuf>, force: bool) {
    let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("Set REGISTRAR_JWT_SECRET, then run:");
    println!("  registrar bootstrap-admin --config {} --handle admin --email admin@example.com", output_path.display());
    println!("  registrar serve --config {}", output_path.display());
}

/// Load config and start logging; exits the process on failure.
fn load_config(config_path: &Path) -> RegistrarConfig {
    let config = match RegistrarConfig::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }
    config
}

async fn connect(config: &RegistrarConfig) -> DbPool {
    match DbPool::from_config(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(config_path: &Path) {
    let config = load_config(config_path);
    tracing::info!(config_file = %config_path.display(), "Running database migrations");

    let pool = connect(&config).await;
    if let Err(e) = pool.run_migrations().await {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Database migrations completed successfully");
}

async fn run_bootstrap_admin(config_path: &Path, input: CreateIdentity) {
    if let Err(e) = input.validate() {
        eprintln!("Invalid administrator details: {}", e);
        std::process::exit(1);
    }

    let config = load_config(config_path);
    let pool = connect(&config).await;
    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }

    let state = AppState::new(config, pool);
    match state.services.identities.bootstrap_admin(input).await {
        Ok(view) => println!(
            "Created ADMIN '{}' ({})",
            view.identity.handle, view.identity.id
        ),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_server(config_path: &Path) {
    let config = load_config(config_path);
    tracing::info!(config_file = %config_path.display(), "Starting registrar");

    let pool = connect(&config).await;
    if config.database.run_migrations()
        && let Err(e) = pool.run_migrations().await
    {
        tracing::error!(error = %e, "Database migrations failed");
        std::process::exit(1);
    }

    let addr = std::net::SocketAddr::new(config.server.host, config.server.port);
    let state = AppState::new(config.clone(), pool);
    let app = build_app(&config, state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "database-sqlite")]
    #[test]
    fn starter_config_parses() {
        temp_env::with_var(
            "REGISTRAR_JWT_SECRET",
            Some("0123456789abcdef0123456789abcdef"),
            || {
                let config = RegistrarConfig::from_str(default_config_toml()).unwrap();
                assert_eq!(config.server.port, 8080);
                assert!(config.auth.registration_enabled);
            },
        );
    }
}
