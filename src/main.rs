use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cyborgdb::{CallContext, Client, DistanceMetric, EncryptionKey, IndexConfig, TrainParams};
use std::time::Duration;
use tracing::Level;

#[derive(Parser)]
#[command(version = cyborgdb::VERSION, about = "Command line access to a CyborgDB service")]
struct Cli {
    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Check that the service is up
    Health,
    /// List index names known to the service
    ListIndexes,
    /// Print a fresh 32-byte index key as hex
    GenerateKey,
    /// Create an index; prints the key needed to use it
    CreateIndex {
        /// Index name; a random one is picked when omitted
        #[arg(long)]
        name: Option<String>,
        /// Existing hex key; a new one is generated when omitted
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        embedding_model: Option<String>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Train an existing index
    Train {
        #[arg(long)]
        name: String,
        #[arg(long)]
        key: String,
        /// Cluster count for this training run; the index default when omitted
        #[arg(long = "train-n-lists")]
        train_n_lists: Option<u32>,
        #[arg(long)]
        max_iters: Option<u32>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Delete an index
    DeleteIndex {
        #[arg(long)]
        name: String,
        #[arg(long)]
        key: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// ivf, ivfflat or ivfpq
    #[arg(long, default_value = "ivfflat")]
    index_type: String,
    #[arg(long)]
    dimension: u32,
    #[arg(long, default_value_t = cyborgdb::defaults::DEFAULT_N_LISTS)]
    n_lists: u32,
    #[arg(long, default_value = "euclidean")]
    metric: String,
    #[arg(long)]
    pq_dim: Option<u32>,
    #[arg(long, default_value_t = 8)]
    pq_bits: u32,
}

impl ConfigArgs {
    fn to_config(&self) -> anyhow::Result<IndexConfig> {
        let metric: DistanceMetric = self.metric.parse()?;
        let config = match self.index_type.to_lowercase().as_str() {
            "ivf" => IndexConfig::ivf(self.dimension),
            "ivfflat" => IndexConfig::ivf_flat(self.dimension),
            "ivfpq" => {
                let pq_dim = self.pq_dim.context("--pq-dim is required for ivfpq")?;
                IndexConfig::ivfpq(self.dimension, pq_dim, self.pq_bits)
            }
            other => anyhow::bail!("unknown index type {}", other),
        };
        let config = config.with_metric(metric).with_n_lists(self.n_lists);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let ctx = match cli.timeout {
        Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)),
        None => CallContext::background(),
    };

    match cli.cmd {
        Cmd::GenerateKey => println!("{}", Client::generate_key().to_hex()),
        Cmd::Health => {
            let client = Client::from_env()?;
            let health = client.health(&ctx).await?;
            println!("{}", health.status);
        }
        Cmd::ListIndexes => {
            let client = Client::from_env()?;
            for name in client.list_indexes(&ctx).await? {
                println!("{}", name);
            }
        }
        Cmd::CreateIndex {
            name,
            key,
            embedding_model,
            config,
        } => {
            let client = Client::from_env()?;
            let name = name.unwrap_or_else(|| format!("index-{}", uuid::Uuid::new_v4()));
            let key = match key {
                Some(hex) => EncryptionKey::from_hex(&hex)?,
                None => Client::generate_key(),
            };
            let index = client
                .create_index(&ctx, &name, key, config.to_config()?, embedding_model.as_deref())
                .await
                .with_context(|| format!("creating index {}", name))?;
            println!("name: {}", index.name());
            println!("key:  {}", index.key().to_hex());
        }
        Cmd::Train {
            name,
            key,
            train_n_lists,
            max_iters,
            config,
        } => {
            let client = Client::from_env()?;
            let mut index = client.index(&name, EncryptionKey::from_hex(&key)?, config.to_config()?)?;
            let params = TrainParams {
                n_lists: train_n_lists,
                max_iters,
                ..Default::default()
            };
            index.train(&ctx, &params).await?;
            println!("trained {}", index.name());
        }
        Cmd::DeleteIndex { name, key, config } => {
            let client = Client::from_env()?;
            let index = client.index(&name, EncryptionKey::from_hex(&key)?, config.to_config()?)?;
            index.delete_index(&ctx).await?;
            println!("deleted {}", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_train_args_parse() {
        let key = "00".repeat(32);
        let cli = Cli::try_parse_from([
            "cyborgdb",
            "train",
            "--name",
            "docs",
            "--key",
            key.as_str(),
            "--dimension",
            "8",
            "--n-lists",
            "16",
            "--train-n-lists",
            "4",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Train {
                train_n_lists,
                config,
                ..
            } => {
                assert_eq!(train_n_lists, Some(4));
                assert_eq!(config.to_config().unwrap().n_lists(), 16);
            }
            _ => panic!("expected train"),
        }
    }
}
