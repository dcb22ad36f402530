mod components;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use meshgate_core::{bootstrap::load_config, config::AppConfig, logging, Config};

#[derive(Debug, Parser)]
#[command(name = "meshgate", version, about = "Consul-backed API gateway and service runtime")]
struct Cli {
    /// Config file path (overrides the default search)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route ping requests to services discovered in Consul
    Gateway {
        /// Listen port (overrides app.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve the liveness endpoint and register this instance with Consul
    Service {
        /// Logical service name (overrides app.name)
        #[arg(long)]
        name: Option<String>,
        /// Listen port (overrides app.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn apply_overrides(config: &mut Config, name: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(name) = name {
        config.app.name = name;
    }
    if let Some(port) = port {
        config.app.port = port;
    }
    config
        .validate()
        .map_err(|errors| anyhow::anyhow!("Invalid command line overrides: {}", errors.join("; ")))
}

/// A service must not register under the gateway's default name
fn ensure_service_name(config: &Config) -> Result<()> {
    if config.app.name == AppConfig::default().name {
        anyhow::bail!(
            "The service role needs its own name: pass --name or set app.name (got the default '{}')",
            config.app.name
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = load_config(cli.config.as_deref())?;

    // 2. Apply role-specific overrides
    match &cli.command {
        Command::Gateway { port } => apply_overrides(&mut config, None, *port)?,
        Command::Service { name, port } => {
            apply_overrides(&mut config, name.clone(), *port)?;
            ensure_service_name(&config)?;
        }
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(
        service = %config.app.name,
        http_address = %config.http_address(),
        consul = %config.consul_address(),
        "meshgate starting"
    );

    // 4. Run the selected role until shutdown
    match cli.command {
        Command::Gateway { .. } => server::run_gateway(&config).await,
        Command::Service { .. } => server::run_service(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_roles() {
        let cli = Cli::parse_from(["meshgate", "--config", "gw.yaml", "gateway", "--port", "8081"]);
        assert_eq!(cli.config.as_deref(), Some("gw.yaml"));
        assert!(matches!(cli.command, Command::Gateway { port: Some(8081) }));

        let cli = Cli::parse_from(["meshgate", "service", "--name", "service-a", "--port", "3000"]);
        match cli.command {
            Command::Service { name, port } => {
                assert_eq!(name.as_deref(), Some("service-a"));
                assert_eq!(port, Some(3000));
            }
            Command::Gateway { .. } => panic!("expected service role"),
        }
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = Config::default();
        apply_overrides(&mut config, Some("service-b".to_string()), Some(3002)).unwrap();
        assert_eq!(config.app.name, "service-b");
        assert_eq!(config.app.port, 3002);

        assert!(apply_overrides(&mut config, Some("bad name".to_string()), None).is_err());
    }

    #[test]
    fn test_service_role_rejects_default_name() {
        let mut config = Config::default();
        assert!(ensure_service_name(&config).is_err());

        apply_overrides(&mut config, Some("service-a".to_string()), None).unwrap();
        assert!(ensure_service_name(&config).is_ok());
    }
}
