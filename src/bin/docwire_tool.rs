use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use docwire::prelude::*;
use docwire::{Dispatcher, KvRequest, resolve_timeout};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "docwire-tool")]
#[command(about = "Build, inspect and dry-run key-value requests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the wire frame of a request without sending it
    Build {
        #[command(flatten)]
        request: RequestArgs,
        /// Print the MessagePack bytes as hex instead of JSON
        #[arg(long)]
        hex: bool,
    },
    /// Send a request to a fresh in-memory store and print the response
    Dispatch {
        #[command(flatten)]
        request: RequestArgs,
        /// JSON document stored under the key before dispatching
        #[arg(long)]
        seed: Option<String>,
    },
    /// Show which timeout a write would get
    Timeout {
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, value_enum)]
        durability: Option<LevelArg>,
        #[arg(long, default_value_t = 0)]
        persist_to: u8,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    Get,
    GetAndLock,
    GetAndTouch,
    Exists,
    Insert,
    Upsert,
    Replace,
    Remove,
    Touch,
    Unlock,
    LookupIn,
    MutateIn,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    None,
    Majority,
    MajorityAndPersistToActive,
    PersistToMajority,
}

impl From<LevelArg> for DurabilityLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::None => DurabilityLevel::None,
            LevelArg::Majority => DurabilityLevel::Majority,
            LevelArg::MajorityAndPersistToActive => DurabilityLevel::MajorityAndPersistToActive,
            LevelArg::PersistToMajority => DurabilityLevel::PersistToMajority,
        }
    }
}

#[derive(Args)]
struct RequestArgs {
    #[arg(value_enum)]
    op: OpArg,
    #[arg(long)]
    key: String,
    #[arg(long, default_value = "default")]
    bucket: String,
    #[arg(long, default_value = "_default")]
    scope: String,
    #[arg(long, default_value = "_default")]
    collection: String,
    /// JSON document body for insert, upsert and replace
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    cas: Option<u64>,
    #[arg(long)]
    expiry_secs: Option<u64>,
    #[arg(long, default_value_t = 15)]
    lock_secs: u64,
    #[arg(long, value_enum)]
    durability: Option<LevelArg>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Projected path for get, repeatable
    #[arg(long)]
    project: Vec<String>,
    #[arg(long)]
    with_expiry: bool,
    /// Path read by lookup-in, repeatable
    #[arg(long)]
    lookup: Vec<String>,
    /// `path=json` upserted by mutate-in, repeatable
    #[arg(long)]
    set: Vec<String>,
    /// JSON file with `kv_timeout_ms` and `kv_durable_timeout_ms`
    #[arg(long)]
    config: Option<PathBuf>,
}

impl RequestArgs {
    fn durability(&self) -> Durability {
        self.durability
            .map(|level| Durability::Level(level.into()))
            .unwrap_or_default()
    }

    fn expiry(&self) -> Expiry {
        self.expiry_secs
            .map(|secs| Expiry::relative(Duration::from_secs(secs)))
            .unwrap_or_default()
    }

    fn content(&self) -> Result<Content> {
        let raw = self
            .content
            .as_deref()
            .ok_or_else(|| anyhow!("--content is required for this operation"))?;
        let value: Value = serde_json::from_str(raw).context("--content is not valid JSON")?;
        Ok(Content::Json(value))
    }

    fn mutate_specs(&self) -> Result<Vec<MutateInSpec>> {
        self.set
            .iter()
            .map(|entry| {
                let (path, raw) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--set expects path=json, got '{}'", entry))?;
                let value: Value = serde_json::from_str(raw)
                    .with_context(|| format!("value for '{}' is not valid JSON", path))?;
                Ok(MutateInSpec::upsert(path, value).create_path())
            })
            .collect()
    }
}

fn load_timeouts(path: Option<&Path>) -> Result<TimeoutConfig> {
    let Some(path) = path else {
        return Ok(TimeoutConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    TimeoutConfig::from_json(&raw).map_err(|err| anyhow!(err))
}

fn collection(args: &RequestArgs, dispatcher: Arc<InMemoryDispatcher>) -> Result<Collection> {
    let timeouts = load_timeouts(args.config.as_deref())?;
    let env = ClientEnvironment::new().timeout_config(timeouts);
    let topology = StaticTopology::with_bucket(
        BucketConfig::new(&args.bucket, 1).with_capability(BucketCapability::CreateAsDeleted),
    );
    Ok(Collection::new(
        CollectionIdentifier::new(&args.bucket, &args.scope, &args.collection),
        Arc::new(env),
        dispatcher,
        Arc::new(topology),
    ))
}

async fn build_request(collection: &Collection, args: &RequestArgs) -> Result<KvRequest> {
    let key = args.key.as_str();
    let timeout = args.timeout_ms.map(Duration::from_millis);
    let cas = Cas::new(args.cas.unwrap_or(0));

    macro_rules! with_timeout {
        ($options:expr) => {
            match timeout {
                Some(timeout) => $options.timeout(timeout),
                None => $options,
            }
        };
    }

    let request = match args.op {
        OpArg::Get => collection.get_request(
            key,
            &with_timeout!(GetOptions::new()
                .project(args.project.iter().cloned())
                .with_expiry(args.with_expiry)),
        )?,
        OpArg::GetAndLock => collection.get_and_lock_request(
            key,
            Duration::from_secs(args.lock_secs),
            &with_timeout!(GetAndLockOptions::new()),
        )?,
        OpArg::GetAndTouch => collection.get_and_touch_request(
            key,
            args.expiry(),
            &with_timeout!(GetAndTouchOptions::new()),
        )?,
        OpArg::Exists => collection.exists_request(key, &with_timeout!(ExistsOptions::new()))?,
        OpArg::Insert => collection.insert_request(
            key,
            &args.content()?,
            &with_timeout!(InsertOptions::new()
                .durability(args.durability())
                .expiry(args.expiry())),
        )?,
        OpArg::Upsert => collection.upsert_request(
            key,
            &args.content()?,
            &with_timeout!(UpsertOptions::new()
                .durability(args.durability())
                .expiry(args.expiry())),
        )?,
        OpArg::Replace => collection.replace_request(
            key,
            &args.content()?,
            &with_timeout!(ReplaceOptions::new()
                .durability(args.durability())
                .expiry(args.expiry())
                .cas(cas)),
        )?,
        OpArg::Remove => collection.remove_request(
            key,
            &with_timeout!(RemoveOptions::new().durability(args.durability()).cas(cas)),
        )?,
        OpArg::Touch => {
            collection.touch_request(key, args.expiry(), &with_timeout!(TouchOptions::new()))?
        }
        OpArg::Unlock => collection.unlock_request(key, cas, &with_timeout!(UnlockOptions::new()))?,
        OpArg::LookupIn => {
            let specs = args.lookup.iter().map(LookupInSpec::get).collect::<Vec<_>>();
            collection.lookup_in_request(key, &specs, &with_timeout!(LookupInOptions::new()))?
        }
        OpArg::MutateIn => {
            let specs = args.mutate_specs()?;
            let options = with_timeout!(MutateInOptions::new()
                .durability(args.durability())
                .expiry(args.expiry())
                .store_semantics(StoreSemantics::Upsert)
                .cas(cas));
            collection.mutate_in_request(key, &specs, &options).await?
        }
    };
    Ok(request)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Build { request, hex } => {
            let dispatcher = Arc::new(InMemoryDispatcher::new());
            let collection = collection(&request, dispatcher)?;
            let built = build_request(&collection, &request).await?;
            if hex {
                println!("{}", to_hex(&built.encode_wire()?));
            } else {
                println!("{}", serde_json::to_string_pretty(&built.frame())?);
            }
            Ok(())
        }
        Command::Dispatch { request, seed } => {
            let dispatcher = Arc::new(InMemoryDispatcher::new());
            let collection = collection(&request, Arc::clone(&dispatcher))?;
            if let Some(seed) = seed {
                let value: Value = serde_json::from_str(&seed).context("--seed is not valid JSON")?;
                collection
                    .upsert(&request.key, value, UpsertOptions::new())
                    .await
                    .context("Failed to seed the in-memory store")?;
            }
            let built = build_request(&collection, &request).await?;
            let name = built.name();
            match dispatcher.dispatch(built).await {
                Ok(response) => println!("{} -> {:#?}", name, response),
                Err(err) => println!("{} failed: {}", name, err),
            }
            Ok(())
        }
        Command::Timeout {
            timeout_ms,
            durability,
            persist_to,
            config,
        } => {
            let timeouts = load_timeouts(config.as_deref())?;
            let persist_to = match persist_to {
                0 => PersistTo::None,
                1 => PersistTo::One,
                2 => PersistTo::Two,
                3 => PersistTo::Three,
                4 => PersistTo::Four,
                other => return Err(anyhow!("--persist-to must be 0..=4, got {}", other)),
            };
            let resolved = resolve_timeout(
                timeout_ms.map(Duration::from_millis),
                durability.map(DurabilityLevel::from),
                persist_to,
                timeouts.kv_timeout,
                timeouts.kv_durable_timeout,
            );
            println!("{:?}", resolved);
            Ok(())
        }
    }
}
