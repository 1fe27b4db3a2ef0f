//! ldapd - LDAPv3 directory server
//!
//! Serves a configured directory over LDAP with SASL binds, paged searches
//! and StartTLS.

use clap::{Parser, Subcommand};
use ldapd_schema::Schema;
use ldapd_server::metrics::run_metrics_server;
use ldapd_server::{
    tls, Config, HandlerOptions, Metrics, PasswordValidator, RequestHandler, Server, ServerConfig,
    StaticDirectory,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ldapd")]
#[command(about = "LDAPv3 directory server")]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "LDAPD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    /// Print the hash of a password for use as `password_hash`
    HashPassword {
        /// Password to hash
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Commands::HashPassword { password }) = &cli.command {
        println!("{}", PasswordValidator::hash_password(password.as_bytes()));
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            } else {
                tracing::info!("Using default configuration");
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    // Load password hashes from external file if configured
    if let Err(e) = config.load_secrets() {
        tracing::error!("Failed to load directory secrets: {}", e);
        return Err(e.into());
    }

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting ldapd server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Naming context: {}", config.directory.base_dn);
    tracing::info!(
        "  Directory: {} user(s), {} group(s)",
        config.directory.users.len(),
        config.directory.groups.len()
    );
    tracing::info!(
        "  SASL mechanisms: {}",
        config.features.sasl_mechanisms.join(", ")
    );

    let schema: Schema = config.build_schema()?;
    tracing::info!(
        "  Schema: {} attribute types, {} object classes",
        schema.attribute_types().count(),
        schema.object_classes().count()
    );
    let directory = StaticDirectory::new(
        &schema,
        &config.directory,
        config.features.allow_anonymous,
    )?;

    let tls_acceptor = if config.tls.enabled {
        let acceptor = tls::create_tls_acceptor(&config.tls)?;
        if config.tls.implicit {
            tracing::info!("  TLS: enabled (LDAPS)");
        } else {
            tracing::info!("  TLS: enabled (StartTLS)");
        }
        if config.tls.require_client_cert {
            tracing::info!("  mTLS: enabled (client certificate required)");
        }
        Some(acceptor)
    } else {
        tracing::info!("  TLS: disabled");
        None
    };

    let handler = RequestHandler::new(schema, Arc::new(directory))?
        .with_options(HandlerOptions::from_config(&config))
        .with_sasl_mechanisms(config.features.sasl_mechanisms.as_slice());

    let mut server_config = ServerConfig::new(config.network.bind_addr);
    server_config.idle_timeout = config.network.idle_timeout();
    server_config.max_connections = config.network.max_connections;
    if let Some(acceptor) = tls_acceptor {
        server_config = server_config.with_tls(acceptor, config.tls.implicit);
    }

    let (metrics_shutdown, _) = broadcast::channel(1);
    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        server_config = server_config.with_metrics(metrics.clone());
        let addr = config.metrics.bind_addr;
        let shutdown_rx = metrics_shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let server = Arc::new(Server::new(server_config, handler));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
        let _ = metrics_shutdown.send(());
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
