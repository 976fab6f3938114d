use clap::Parser;
use radius_oidc::{
    http, start_sweeper, AssignmentAttribute, AuthorizationServer, Config, HostPool,
    MemoryCredentialStore, RadiusGateway, SigningConfig, TokenIssuer,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OAuth2 / OpenID Connect provider authenticating against RADIUS
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-oidc")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load or create configuration (without logging first)
    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            if std::path::Path::new(&cli.config_path).exists() {
                error!("Could not load config file {}: {}", cli.config_path, e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config_path);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        print_summary(&config);
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("radius-oidc v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(HostPool::from_config(&config.radius)?);
    let assignment = AssignmentAttribute::from_config(&config.radius.assignment)?;
    let gateway = RadiusGateway::new(
        Arc::clone(&pool),
        assignment,
        config.radius.require_message_authenticator,
    );

    let issuer = Arc::new(TokenIssuer::new(
        config.signing.clone(),
        config.oauth.issuer.clone(),
        config.oauth.client_id.clone(),
    ));
    issuer.init().await?;
    info!(algorithm = ?issuer.algorithm(), "Token signing key ready");

    let store = Arc::new(MemoryCredentialStore::new(config.oauth.max_entries));

    let mut tasks = Vec::new();
    let health = &config.radius.health_check;
    if health.enabled {
        tasks.push(pool.start_health_checker(Duration::from_secs(health.interval)));
    } else {
        warn!("RADIUS health checks disabled; failover only happens on login timeouts");
    }
    tasks.push(start_sweeper(store.clone(), config.oauth.sweep_interval()));

    let server = AuthorizationServer::new(
        config.oauth.clone(),
        Arc::new(gateway),
        store,
        issuer,
        config.radius.timeout(),
    );
    let app = http::router(Arc::new(server));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    info!("Press Ctrl+C to stop");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    for task in tasks {
        task.shutdown().await;
    }
    info!("Server stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn print_summary(config: &Config) {
    println!("Configuration validated successfully!");
    println!();
    println!("Configuration summary:");
    println!("  Listen: {}", config.listen_address);
    println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
    println!("  Issuer: {}", config.oauth.issuer);
    println!("  Client: {}", config.oauth.client_id);
    match &config.signing {
        SigningConfig::Rsa { key_path } => println!("  Signing: RS256 ({})", key_path.display()),
        SigningConfig::SharedSecret { .. } => println!("  Signing: HS256 (shared secret)"),
    }
    println!();

    println!("RADIUS hosts (in priority order):");
    for host in &config.radius.hosts {
        println!("  {}", host);
    }
    let health = &config.radius.health_check;
    if health.enabled {
        println!("  Health check every {}s", health.interval);
    } else {
        println!("  Health check disabled");
    }
    println!();

    if config.oauth.redirect_uris.is_empty() {
        println!("WARNING: No redirect URIs configured; only same-origin redirects are allowed");
    } else {
        println!("Redirect URIs:");
        for uri in &config.oauth.redirect_uris {
            println!("  {}", uri);
        }
    }
    if config.oauth.permitted_classes.is_empty() {
        println!("All authenticated users are admitted");
    } else {
        println!("Permitted classes: {}", config.oauth.permitted_classes.join(", "));
    }
}
