use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::config::{DEFAULT_CONFIG_FILE, ServerConfig};
use crate::core::jobs::StoreAcceptor;
use crate::core::lifecycle::LifecycleManager;
use crate::core::models::BridgeType;
use crate::core::models::assignment::AssignmentSpec;
use crate::core::store::{SpecStore, SqliteStore};
use crate::core::terminal;
use crate::interfaces::web::ApiServer;
use crate::logging;

/// Overrides for `serve`; anything unset comes from the config file.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ServeFlags {
    pub config: Option<PathBuf>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub db: Option<PathBuf>,
}

impl ServeFlags {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.api_host {
            config.api.host = host.clone();
        }
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
        if let Some(db) = &self.db {
            config.database.path = db.clone();
        }
    }
}

pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> Result<ServeFlags> {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match flag {
            "--config" | "-c" => flags.config = Some(PathBuf::from(value()?)),
            "--api-host" => flags.api_host = Some(value()?),
            "--api-port" => {
                let raw = value()?;
                flags.api_port = Some(
                    raw.parse()
                        .with_context(|| format!("invalid --api-port '{}'", raw))?,
                );
            }
            "--db" => flags.db = Some(PathBuf::from(value()?)),
            other => bail!("unknown flag '{}'", other),
        }
        i += 2;
    }
    Ok(flags)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("serve") => serve(parse_serve_flags(&args, 2)?).await,
        Some("convert") => {
            let source = args
                .get(2)
                .context("convert needs a file path, or - for stdin")?;
            convert(source).await
        }
        Some("help") | Some("--help") | Some("-h") | None => {
            terminal::print_usage();
            Ok(())
        }
        Some(other) => {
            terminal::print_usage();
            bail!("unknown command '{}'", other)
        }
    }
}

async fn serve(flags: ServeFlags) -> Result<()> {
    let config_path = flags
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = ServerConfig::load(&config_path).await?;
    flags.apply(&mut config);

    let log_tx = logging::init(&config.logging.level);
    info!("Starting jobspecs with config {}", config_path.display());

    let store: Arc<dyn SpecStore> = Arc::new(SqliteStore::open(&config.database.path).await?);
    for bridge in &config.bridges {
        let bridge = BridgeType::new(&bridge.name, &bridge.url);
        store.register_bridge(&bridge).await?;
        info!("Registered bridge {} -> {}", bridge.name, bridge.url);
    }
    let acceptor = Arc::new(StoreAcceptor::new(store.clone()));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        &config, store, acceptor, log_tx,
    ))));
    lifecycle.start().await?;
    debug!("Lifecycle state: {:?}", lifecycle.state());

    terminal::print_link("Job specs", &format!("http://{}/v2/specs", config.api_addr()));
    terminal::print_status("Database", &config.database.path.display().to_string());
    terminal::print_info("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await
}

async fn convert(source: &str) -> Result<()> {
    let raw = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("reading {}", source))?
    };
    let doc = convert_document(&raw)?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

/// Legacy assignment JSON in, canonical job spec JSON (ready to POST) out.
pub(crate) fn convert_document(raw: &str) -> Result<serde_json::Value> {
    let assignment: AssignmentSpec =
        serde_json::from_str(raw).context("parsing assignment document")?;
    let spec = assignment.convert_to_job_spec()?;
    let mut doc = serde_json::to_value(&spec)?;
    if let Some(map) = doc.as_object_mut() {
        map.remove("id");
        map.remove("createdAt");
    }
    Ok(doc)
}
