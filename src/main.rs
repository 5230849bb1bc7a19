//! `talond` — the agent host daemon.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use talon::{
    ai::{ModelRouter, ProviderSet, provider::UnconfiguredProvider},
    gateway::DEFAULT_GATEWAY_PORT,
    runtime::{AgentRuntime, Collaborators, RuntimeOptions},
    triggers::DEFAULT_WEBHOOK_PORT,
};

#[derive(Debug, Parser)]
#[command(name = "talond", about = "Headless local AI agent host")]
struct Cli {
    /// Workspace root; all agent file operations are confined to it.
    #[arg(long, env = "AGENT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Control-plane bind host.
    #[arg(long, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    gateway_host: String,

    /// Control-plane port.
    #[arg(long, env = "GATEWAY_PORT", default_value_t = DEFAULT_GATEWAY_PORT)]
    gateway_port: u16,

    /// Webhook listener port.
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    webhook_port: u16,

    /// Disable the HTTP control plane entirely.
    #[arg(long)]
    no_gateway: bool,
}

fn default_workspace() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".talon")
        .join("workspace")
}

/// Build the provider set from the environment. Concrete HTTP adapters are
/// registered by name; with nothing configured the runtime still boots and
/// every LLM call reports how to fix it.
fn providers_from_env() -> (ProviderSet, ModelRouter) {
    let provider_id = std::env::var("LLM_PROVIDER").unwrap_or_default();
    if provider_id.is_empty() {
        log::warn!("LLM_PROVIDER is not set; LLM calls will fail until a provider is configured");
        return (
            ProviderSet::new("unconfigured", Arc::new(UnconfiguredProvider)),
            ModelRouter::default_routes("unconfigured"),
        );
    }
    // Adapter crates register themselves under the provider id; the core
    // only needs the id to route by.
    (
        ProviderSet::new(provider_id.clone(), Arc::new(UnconfiguredProvider)),
        ModelRouter::default_routes(&provider_id),
    )
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let workspace = cli.workspace.unwrap_or_else(default_workspace);
    std::fs::create_dir_all(&workspace).ok();

    talon::logging::init(&workspace);

    let (providers, router) = providers_from_env();
    let options = RuntimeOptions {
        workspace,
        gateway_host: cli.gateway_host,
        gateway_port: cli.gateway_port,
        webhook_port: cli.webhook_port,
        enable_gateway: !cli.no_gateway,
        skills: Vec::new(),
    };

    let runtime =
        match AgentRuntime::start(options, providers, router, Collaborators::default()).await {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        };

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("signal handler failed: {e}");
    }
    runtime.shutdown().await;
}
