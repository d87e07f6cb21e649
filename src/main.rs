use serde_json::{Value, json};
use std::sync::Arc;
use unite_cluster::cli::{CliArgs, Mode, USAGE, UnitArg};
use unite_cluster::node::service::NodeService;
use unite_cluster::node::types::default_node_name;
use unite_cluster::status;
use unite_cluster::unit::invoke::MethodTable;
use unite_cluster::unit::types::{Unit, UnitContext, UnitControl};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let cli = match CliArgs::parse(&args[1..]) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: {} {}", args[0], USAGE);
            eprintln!("Example: {} --hub-listen 127.0.0.1:7000 --unit a1", args[0]);
            eprintln!(
                "Example: {} --hub 127.0.0.1:7000 --unit b1=a1 --unit b2",
                args[0]
            );

            std::process::exit(1);
        }
    };

    let name = cli.name.unwrap_or_else(default_node_name);
    let units = cli.units.into_iter().map(demo_unit).collect::<Vec<_>>();

    tracing::info!("Starting node {} with {} unit(s)", name, units.len());

    let node = NodeService::new(&name, units, cli.config)?;

    if let Some(http_addr) = cli.http_addr {
        let handle = node.handle();
        tokio::spawn(async move {
            if let Err(e) = status::serve(http_addr, handle).await {
                tracing::error!("Status endpoint failed: {}", e);
            }
        });
    }

    let shutdown_handle = node.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
            shutdown_handle.shutdown();
        }
    });

    match cli.mode {
        Mode::Hub(listen_addr) => node.run_hub(&listen_addr).await,
        Mode::Join(hub_addr) => node.run(&hub_addr).await,
    }
}

/// Builds a demo unit from a `--unit` argument.
///
/// It answers `ping` and `echo`, and pings each dependency once started.
fn demo_unit(arg: UnitArg) -> Unit {
    let UnitArg { id, depends } = arg;

    let pong = format!("pong from {}", id);
    let methods = MethodTable::new()
        .with("ping", move |_args| {
            let pong = pong.clone();
            async move { Ok(Some(json!(pong))) }
        })
        .with("echo", |args| async move { Ok(Some(Value::Array(args))) });

    Unit::new(&id, methods.into_invocable())
        .with_depends(depends.clone())
        .with_control(Arc::new(PingDependencies { depends }))
}

struct PingDependencies {
    depends: Vec<String>,
}

impl UnitControl for PingDependencies {
    fn on_init(&self, ctx: &UnitContext) {
        tracing::info!("Unit {} initialized", ctx.unit_id);
    }

    fn on_start(&self, ctx: &UnitContext) {
        for dependency in &self.depends {
            let node = ctx.node.clone();
            let from = ctx.unit_id.clone();
            let dependency = dependency.clone();

            tokio::spawn(async move {
                match node.call(&dependency, "ping", vec![]).await {
                    Ok(reply) => tracing::info!("{} -> {}: {:?}", from, dependency, reply),
                    Err(e) => tracing::warn!("{} -> {} failed: {}", from, dependency, e),
                }
            });
        }
    }
}
