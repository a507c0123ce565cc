//! `daa-server` command line: `serve` the HTTP API or `run` a single task file

use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use daa_server::{build_orchestrator, routes, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warp::Filter;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML or YAML configuration file");

    Command::new("daa-server")
        .version(daa_server::VERSION)
        .about("Data Analyst Agent service")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the HTTP API")
                .arg(config_arg.clone())
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .help("Listen address, overrides config and DAA_BIND"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Answer a single task file and print the JSON result")
                .arg(config_arg)
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("File containing the task description"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .value_parser(value_parser!(u64))
                        .help("Request budget in milliseconds"),
                ),
        )
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<ServerConfig> {
    let path = args.get_one::<PathBuf>("config");
    ServerConfig::load(path.map(PathBuf::as_path)).context("loading configuration")
}

async fn serve(args: &ArgMatches) -> anyhow::Result<()> {
    let mut config = load_config(args)?;
    if let Some(bind) = args.get_one::<String>("bind") {
        config.bind.clone_from(bind);
    }
    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind))?;
    let orchestrator = build_orchestrator(&config)?;

    let (bound, server) = warp::serve(routes(orchestrator).with(warp::trace::request()))
        .try_bind_with_graceful_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested");
        })
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!("DAA server v{} listening on {}", daa_server::VERSION, bound);
    server.await;
    Ok(())
}

async fn run(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let path = args
        .get_one::<PathBuf>("file")
        .context("--file is required")?;
    let task = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let timeout_ms = args
        .get_one::<u64>("timeout-ms")
        .copied()
        .unwrap_or(config.core.default_timeout_ms);

    let orchestrator = build_orchestrator(&config)?;
    match orchestrator.handle(&task, timeout_ms).await {
        Ok(answer) => {
            println!("{}", serde_json::to_string_pretty(&answer)?);
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let format = matches
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_tracing(format);

    match matches.subcommand() {
        Some(("serve", args)) => serve(args).await,
        Some(("run", args)) => {
            if !run(args).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand '{other}'"),
        None => anyhow::bail!("a subcommand is required: serve or run"),
    }
}
