//! Command Line Parsing
//!
//! Hand-rolled flag parsing for the `unite` binary. A node either serves as the hub
//! (`--hub-listen`) or joins one (`--hub`), never both.

use crate::node::types::NodeConfig;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const USAGE: &str = "(--hub-listen <addr:port> | --hub <addr:port>) [--name <name>] \
     [--unit <id>[=dep,dep]]... [--port-base <port>] [--listen-host <host>] \
     [--rpc-timeout-ms <ms>] [--http <addr:port>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Serve as hub on this address.
    Hub(String),
    /// Join the hub at this address.
    Join(String),
}

/// A `--unit id=dep,dep` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitArg {
    pub id: String,
    pub depends: Vec<String>,
}

impl UnitArg {
    pub fn parse(arg: &str) -> Result<Self> {
        let (id, depends) = match arg.split_once('=') {
            Some((id, deps)) => (
                id.trim(),
                deps.split(',')
                    .map(str::trim)
                    .filter(|dep| !dep.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (arg.trim(), Vec::new()),
        };

        if id.is_empty() {
            anyhow::bail!("Unit argument '{}' has no id", arg);
        }

        Ok(Self {
            id: id.to_string(),
            depends,
        })
    }
}

#[derive(Debug)]
pub struct CliArgs {
    pub mode: Mode,
    pub name: Option<String>,
    pub units: Vec<UnitArg>,
    pub http_addr: Option<SocketAddr>,
    pub config: NodeConfig,
}

impl CliArgs {
    /// Parses everything after the program name. Unknown flags are skipped.
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut hub_listen: Option<String> = None;
        let mut hub: Option<String> = None;
        let mut name: Option<String> = None;
        let mut units: Vec<UnitArg> = vec![];
        let mut http_addr: Option<SocketAddr> = None;
        let mut config = NodeConfig::default();

        let mut i = 0;
        while i < args.len() {
            let value = || {
                args.get(i + 1)
                    .cloned()
                    .with_context(|| format!("{} needs a value", args[i]))
            };

            match args[i].as_str() {
                "--hub-listen" => hub_listen = Some(value()?),
                "--hub" => hub = Some(value()?),
                "--name" => name = Some(value()?),
                "--unit" => units.push(UnitArg::parse(&value()?)?),
                "--port-base" => config.hub_port_base = value()?.parse()?,
                "--listen-host" => config.listen_host = value()?,
                "--rpc-timeout-ms" => {
                    config.rpc_timeout = Some(Duration::from_millis(value()?.parse()?))
                }
                "--http" => http_addr = Some(value()?.parse()?),
                other => {
                    tracing::warn!("Ignoring unknown argument {}", other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        let mode = match (hub_listen, hub) {
            (Some(_), Some(_)) => {
                anyhow::bail!("--hub-listen and --hub cannot be used together")
            }
            (Some(listen_addr), None) => Mode::Hub(listen_addr),
            (None, Some(hub_addr)) => Mode::Join(hub_addr),
            (None, None) => anyhow::bail!("Either --hub-listen or --hub is required"),
        };

        Ok(Self {
            mode,
            name,
            units,
            http_addr,
            config,
        })
    }
}

#[cfg(test)]
mod tests;
