use anyhow::Result;
use clap::Parser;
use common::traits::{IsChainClient, IsNotifier};
use common::types::{Address, TokenAddresses};
use config::BotConfig;
use notify::{LogNotifier, TelegramNotifier};
use orchestrator::SessionDriver;
use std::path::Path;
use std::sync::Arc;

mod sim;
use sim::SimulatedChainClient;

/// Command line arguments for swap-bot.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the bot configuration YAML
    #[arg(long, default_value = "config/default.yml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let config = BotConfig::load(Path::new(&args.config))?;

    let notifier: Arc<dyn IsNotifier> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )),
        None => Arc::new(LogNotifier),
    };

    let tokens = TokenAddresses {
        usdt: Address(config.tokens.usdt.clone()),
        eth: Address(config.tokens.eth.clone()),
        btc: Address(config.tokens.btc.clone()),
    };
    let client: Arc<dyn IsChainClient> = Arc::new(SimulatedChainClient::new(tokens));

    SessionDriver::new(config, client, notifier).run().await
}
