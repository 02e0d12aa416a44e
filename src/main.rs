//! Trace Query Server - binary entry point
//!
//! `trace-query-server <store>` serves queries over stdio for one instance.
//! `trace-query-server --shutdown` stops the running server of an instance.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use trace_query::config::ServerConfig;
use trace_query::event_store::StoreHandle;
use trace_query::lifecycle::{InstanceLock, LifecycleManager, StateMachine, Supervisor};
use trace_query::protocol::ServerInfo;
use trace_query::query::QueryEngine;
use trace_query::server::McpServer;
use trace_query::tools::register_all_tools;
use trace_query::utils::init_logging;

/// Covers clients probing the lock while this server starts
const LOCK_RETRY_WINDOW: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "trace-query-server", version, about = "Query server for simulation run traces")]
struct Cli {
    /// SQLite trace store to serve
    #[arg(env = "TRACE_QUERY_STORE", required_unless_present = "shutdown")]
    store_path: Option<PathBuf>,

    /// Stop the running server of this instance and exit
    #[arg(long)]
    shutdown: bool,

    /// Instance name shared by the producer and the server
    #[arg(long, env = "TRACE_QUERY_INSTANCE")]
    instance: Option<String>,

    /// Directory for the lock, signal, status and log files
    #[arg(long, env = "TRACE_QUERY_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    #[arg(long, env = "TRACE_QUERY_LOG", default_value = "info")]
    log_level: String,

    /// Keep serving after stdin closes; set when spawned in the background
    #[arg(long, hide = true)]
    detached: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = ServerConfig::from_env();
    if let Some(dir) = &cli.runtime_dir {
        config = config.with_runtime_dir(dir);
    }
    if let Some(instance) = &cli.instance {
        config = config.with_instance(instance.as_str());
    }

    if cli.shutdown {
        return request_shutdown(config);
    }

    let store_path = cli.store_path.context("store path is required")?;
    serve(config, store_path, cli.detached)
}

fn request_shutdown(config: ServerConfig) -> anyhow::Result<ExitCode> {
    let instance = config.instance.clone();
    let manager = LifecycleManager::new(config);
    if manager.shutdown()? {
        info!(instance = %instance, "server stopped");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(instance = %instance, "no server running");
        Ok(ExitCode::from(1))
    }
}

fn serve(config: ServerConfig, store_path: PathBuf, detached: bool) -> anyhow::Result<ExitCode> {
    let _lock = match InstanceLock::acquire_within(
        config.lock_path(),
        LOCK_RETRY_WINDOW,
        config.poll_interval,
    )? {
        Some(lock) => lock,
        None => {
            error!(instance = %config.instance, "a server is already running for this instance");
            return Ok(ExitCode::from(2));
        }
    };
    info!(
        pid = std::process::id(),
        instance = %config.instance,
        store = %store_path.display(),
        detached,
        "starting trace query server"
    );

    let store = Arc::new(StoreHandle::detached(&store_path));
    let machine = Arc::new(StateMachine::new());
    let engine = Arc::new(QueryEngine::with_limits(store.clone(), config.limits));

    let mut server = McpServer::with_info(ServerInfo::default());
    register_all_tools(&mut server, engine, machine.clone());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("installing signal handler")?;
    }

    let mut supervisor = Supervisor::new(config, store, machine);
    supervisor.start()?;

    {
        let stop = stop.clone();
        thread::Builder::new()
            .name("rpc".to_string())
            .spawn(move || {
                if let Err(e) = server.run() {
                    error!(error = %e, "rpc loop failed");
                }
                if !detached {
                    stop.store(true, Ordering::Release);
                }
            })
            .context("spawning rpc thread")?;
    }

    supervisor.run(&stop)?;
    Ok(ExitCode::SUCCESS)
}
