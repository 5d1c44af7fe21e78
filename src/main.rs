//! wsrp: administration tool for the WSRP producer and consumer cores.
//!
//! Usage:
//!   wsrp validate-config                          # Check ~/.wsrp/wsrp-producer-config.json
//!   wsrp registrations --db ./registrations.db    # Dump the producer registration store
//!   wsrp consumers list                           # Producers known to the consumer
//!   wsrp consumers add acme http://acme/wsrp --consumer-name portal
//!   wsrp inspect-export 0002454300...             # Decode an export blob (hex or --base64)

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use base64::Engine;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wsrp_consumer::{ConsumerRegistry, RegistrationInfo};
use wsrp_producer::export::data::{self, Encoded, ExportContext, ExportData, ExportPortletData, read_header};
use wsrp_producer::registration::RegistrationPersistenceManager;
use wsrp_producer::{PersistentRegistrationStore, ProducerConfiguration};

#[derive(Parser, Debug)]
#[command(name = "wsrp", about = "WSRP producer/consumer administration")]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.wsrp/logs/wsrp.log if no path given)
    #[arg(long, global = true, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a producer configuration file
    ValidateConfig {
        /// Configuration file (defaults to ~/.wsrp/wsrp-producer-config.json)
        path: Option<PathBuf>,
    },

    /// List consumers, groups and registrations of a producer store
    Registrations {
        /// SQLite database (defaults to ~/.wsrp/registrations.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Manage the producers known to the consumer
    Consumers {
        /// Registry file (defaults to ~/.wsrp/wsrp-consumers-config.json)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: ConsumersAction,
    },

    /// Decode the header (and inline payload) of exported portlet data
    InspectExport {
        /// Encoded bytes, hex unless --base64 is given
        data: String,

        #[arg(long)]
        base64: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConsumersAction {
    List,
    Add {
        id: String,
        endpoint_url: String,
        #[arg(long, default_value = "wsrp-rs")]
        consumer_name: String,
    },
    Remove {
        id: String,
    },
    Activate {
        id: String,
    },
    Deactivate {
        id: String,
    },
}

fn wsrp_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".wsrp")
}

fn init_logging(verbose: bool, log_file: Option<&str>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if let Some(log_file_arg) = log_file {
        let log_path = if log_file_arg == "DEFAULT" {
            wsrp_home().join("logs/wsrp.log")
        } else {
            PathBuf::from(log_file_arg)
        };

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open log file {}", log_path.display()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();

        eprintln!("Logging to {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::ValidateConfig { path } => validate_config(path),
        Command::Registrations { db } => list_registrations(db),
        Command::Consumers { config, action } => consumers(config, action),
        Command::InspectExport { data, base64 } => inspect_export(&data, base64),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Producer
// ─────────────────────────────────────────────────────────────────────────────

fn validate_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(ProducerConfiguration::default_path);
    let config = ProducerConfiguration::load(&path)?;
    let requirements = &config.registration_requirements;
    println!("{}: ok", path.display());
    println!(
        "  registration: {}",
        if requirements.registration_required { "required" } else { "not required" }
    );
    println!("  policy: {}", requirements.policy.name);
    println!("  registration properties: {}", requirements.registration_properties.len());
    println!("  cookie protocol: {:?}", config.cookie_protocol);
    println!(
        "  exports: {}",
        if config.export.by_reference { "by reference" } else { "by value" }
    );
    Ok(())
}

fn list_registrations(db: Option<PathBuf>) -> Result<()> {
    let path = db.unwrap_or_else(|| wsrp_home().join("registrations.db"));
    if !path.exists() {
        bail!("no registration store at {}", path.display());
    }
    let store = PersistentRegistrationStore::open(&path)?;

    for group in store.get_consumer_groups() {
        println!("group {} [{}] consumers={}", group.name, group.status, group.consumers.len());
    }
    for consumer in store.get_consumers() {
        println!(
            "consumer {} '{}' [{}] group={} registrations={}",
            consumer.id,
            consumer.name,
            consumer.status,
            consumer.group.as_deref().unwrap_or("-"),
            consumer.registrations.len()
        );
    }
    for registration in store.get_registrations() {
        println!(
            "registration {} handle={} consumer={} [{}] portlets={}",
            registration.id,
            registration.handle,
            registration.consumer_id,
            registration.status,
            registration.known_portlet_handles.len()
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer
// ─────────────────────────────────────────────────────────────────────────────

fn consumers(config: Option<PathBuf>, action: ConsumersAction) -> Result<()> {
    let path = config.unwrap_or_else(ConsumerRegistry::default_path);
    let registry = ConsumerRegistry::open(&path)?;
    debug!("Using consumer registry {}", path.display());

    match action {
        ConsumersAction::List => {
            for producer in registry.list() {
                println!(
                    "{} {} [{}]{}",
                    producer.id,
                    producer.endpoint_url,
                    if producer.active { "active" } else { "inactive" },
                    if producer.registration.is_registered() { " registered" } else { "" }
                );
            }
        }
        ConsumersAction::Add {
            id,
            endpoint_url,
            consumer_name,
        } => {
            registry.create_consumer(&id, &endpoint_url, RegistrationInfo::new(consumer_name))?;
            info!("Added producer '{}'", id);
        }
        ConsumersAction::Remove { id } => {
            registry.remove(&id)?;
            info!("Removed producer '{}'", id);
        }
        ConsumersAction::Activate { id } => registry.activate(&id)?,
        ConsumersAction::Deactivate { id } => registry.deactivate(&id)?,
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Export inspection
// ─────────────────────────────────────────────────────────────────────────────

fn inspect_export(input: &str, is_base64: bool) -> Result<()> {
    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(input.trim())
            .context("input is not valid base64")?
    } else {
        hex::decode(input.trim()).context("input is not valid hex")?
    };

    let (header, _) = read_header(&bytes)?;
    println!("type: {}", header.type_tag);
    println!("version: {}", header.version);
    if !header.is_inline() {
        println!("reference: {}", header.id);
        return Ok(());
    }

    if header.type_tag == ExportContext::TYPE {
        if let Encoded::Inline(context) = data::decode::<ExportContext>(&bytes)? {
            println!("export time: {}", context.export_time);
            println!("by value: {}", context.export_by_value);
            if let Some(termination) = context.termination_time {
                println!("terminates: {termination}");
            }
            println!("portlets: {}", context.portlet_handles.join(", "));
        }
    } else if header.type_tag == ExportPortletData::TYPE {
        if let Encoded::Inline(portlet) = data::decode::<ExportPortletData>(&bytes)? {
            println!("portlet: {}", portlet.portlet_handle);
            println!("state: {} bytes", portlet.state.len());
        }
    } else {
        bail!("unknown export data type '{}'", header.type_tag);
    }
    Ok(())
}
