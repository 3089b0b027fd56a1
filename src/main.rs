//! Interactive NETCONF client
//!
//! Usage:
//!   netconf-cli [--config netconf.yaml] [--host H] [--port P] [--username U]
//!               [--password PW | --private-key FILE]
//!   netconf-cli --get PATH
//!   netconf-cli --get-config PATH [--datastore D]
//!   netconf-cli --edit PATH --value V [--datastore D]
//!
//! Without an operation flag a prompt is started; type `help` for commands.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use netconf_yang::command::{Flow, Shell};
use netconf_yang::config::ClientConfig;
use netconf_yang::request_builder::Operation;
use netconf_yang::transport::Connector;
use netconf_yang::{NetconfClient, Outcome, Result};

#[derive(Parser, Debug)]
#[command(name = "netconf-cli")]
#[command(about = "Schema-aware NETCONF client")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device address
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long)]
    username: Option<String>,

    /// SSH password (prompted for when neither a password nor a key is configured)
    #[arg(short, long)]
    password: Option<String>,

    /// Private key file; --password is then its passphrase
    #[arg(long, value_name = "FILE")]
    private_key: Option<PathBuf>,

    /// running, candidate or startup
    #[arg(long)]
    datastore: Option<String>,

    /// Read config and state data at PATH and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["get_config", "edit"])]
    get: Option<String>,

    /// Read config data at PATH and exit
    #[arg(long = "get-config", value_name = "PATH", conflicts_with = "edit")]
    get_config: Option<String>,

    /// Set the leaf at PATH to --value and exit
    #[arg(long, value_name = "PATH", requires = "value")]
    edit: Option<String>,

    #[arg(long)]
    value: Option<String>,

    /// Report YANG modules that fail to load at warn level
    #[arg(long)]
    verbose_schema_logs: bool,
}

impl Args {
    /// The one-shot operation requested, if any
    fn operation(&self) -> Option<(&'static str, &str, Option<&str>)> {
        if let Some(path) = &self.get {
            Some(("get", path, None))
        } else if let Some(path) = &self.get_config {
            Some(("get-config", path, None))
        } else {
            self.edit
                .as_deref()
                .map(|path| ("set", path, self.value.as_deref()))
        }
    }

    fn apply(&self, config: &mut ClientConfig) -> Result<()> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(key) = &self.private_key {
            config.private_key = Some(key.clone());
        }
        if let Some(datastore) = &self.datastore {
            config.datastore = datastore.parse()?;
        }
        if self.verbose_schema_logs {
            config.verbose_schema_logs = true;
        }
        config.validate()
    }
}

/// Read the password from the terminal when nothing else can authenticate
fn prompt_password(config: &mut ClientConfig) -> Result<()> {
    if config.has_credentials() {
        return Ok(());
    }
    print!("password for {}@{}: ", config.username, config.host);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    config.password = Some(line.trim_end_matches(['\r', '\n']).to_string());
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match ClientConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = args.apply(&mut config).and_then(|_| prompt_password(&mut config)) {
        eprintln!("ERROR: {}", e);
        return ExitCode::FAILURE;
    }
    init_tracing(&config.log_level);
    debug!(?config, "configuration loaded");

    match args.operation() {
        Some((keyword, path, value)) => match one_shot(&config, keyword, path, value).await {
            Ok(Outcome::Data(decoded)) => {
                println!("{}", decoded);
                ExitCode::SUCCESS
            }
            Ok(Outcome::Ok) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                eprintln!("failed to execute the operation");
                ExitCode::FAILURE
            }
        },
        None => match repl(&config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn one_shot(
    config: &ClientConfig,
    keyword: &str,
    path: &str,
    value: Option<&str>,
) -> Result<Outcome> {
    let op = Operation::from_parts(keyword, path, value, config.datastore)?;
    let mut client = NetconfClient::new(config.client_options());
    let session = config.connector()?.connect().await?;
    client.login(session).await?;

    let outcome = client.execute(&op).await;
    client.logout().await;
    outcome
}

async fn repl(config: &ClientConfig) -> Result<()> {
    let connector: Arc<dyn Connector> = Arc::new(config.connector()?);
    let mut shell = Shell::new(NetconfClient::new(config.client_options()), connector);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type 'help' for commands, 'quit' to exit.");
    loop {
        print!("» ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match shell.handle_line(&line).await {
            Ok(Flow::Continue(Some(output))) => println!("{}", output),
            Ok(Flow::Continue(None)) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("ERROR: {}", e),
        }
    }

    shell.shutdown().await;
    Ok(())
}
