//! Workload driver for the ferrite admin client.
//!
//! Runs batched admin operations against an in-process simulated cluster
//! with configurable controller churn and response latency, then prints a
//! per-operation outcome summary. Useful for soaking the dispatcher's
//! retry, timeout, and aggregation paths without a real cluster.

mod sim;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferrite_admin::{
    AclBindingFilter, AdminClient, AdminClientConfig, AdminOptions, ConfigEntry, ConfigResource,
    JsonCodec, NewTopic, Node, ResourceKind, StaticClusterView,
};
use futures_util::future::join_all;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use sim::SimTransport;

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "ferrite-workload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running the workload.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Number of simulated cluster nodes.
    #[arg(long, default_value_t = 3)]
    nodes: u64,

    /// Number of batch rounds to run.
    #[arg(long, default_value_t = 50)]
    rounds: usize,

    /// Topics created (and later deleted) per round.
    #[arg(long, default_value_t = 8)]
    batch_size: usize,

    /// Probability in percent that a response triggers controller churn.
    #[arg(long, default_value_t = 5)]
    churn_pct: u8,

    /// Upper bound for simulated response latency.
    #[arg(long, default_value = "20ms")]
    max_latency: humantime::Duration,

    /// Per-call timeout.
    #[arg(long, default_value = "5s")]
    request_timeout: humantime::Duration,

    /// Random seed (0 picks a random seed).
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Default)]
struct Tally {
    ok: u64,
    failed: u64,
}

impl Tally {
    fn record(&mut self, ok: bool) {
        if ok {
            self.ok += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(run) => run_workload(run).await,
    }
}

async fn run_workload(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.nodes > 0, "--nodes must be at least 1");
    anyhow::ensure!(args.churn_pct <= 100, "--churn-pct must be within 0..=100");

    let seed = if args.seed == 0 {
        rand::thread_rng().gen()
    } else {
        args.seed
    };
    tracing::info!(seed, nodes = args.nodes, rounds = args.rounds, "starting workload");

    let node_ids: Vec<u64> = (0..args.nodes).collect();
    let view = Arc::new(StaticClusterView::with_members(
        node_ids
            .iter()
            .map(|id| Node::new(*id, "sim.local", 9000 + *id as u16)),
    ));
    let transport = SimTransport::new(
        view.clone(),
        node_ids,
        SmallRng::seed_from_u64(seed),
        f64::from(args.churn_pct) / 100.0,
        *args.max_latency,
    );

    let config = AdminClientConfig {
        request_timeout: *args.request_timeout,
        ..AdminClientConfig::default()
    };
    let client = AdminClient::new(
        config,
        Box::new(transport),
        view,
        Arc::new(JsonCodec),
    );
    tracing::info!(client_id = client.client_id(), "client started");

    let started = Instant::now();
    let mut creates = Tally::default();
    let mut alters = Tally::default();
    let mut describes = Tally::default();
    let mut deletes = Tally::default();
    let options = AdminOptions::new();

    for round in 0..args.rounds {
        let names: Vec<String> = (0..args.batch_size)
            .map(|i| format!("wl-{seed:08x}-r{round}-t{i}"))
            .collect();

        // Create a batch of topics against the (moving) controller.
        let topics: Vec<NewTopic> = names
            .iter()
            .map(|name| NewTopic::new(name.clone(), 4, 2))
            .collect();
        let created = client.create_topics(topics, &options);
        for handle in created.results().values() {
            creates.record(handle.get().await.is_ok());
        }

        // Push per-topic config overrides.
        let alterations: Vec<(ConfigResource, Vec<ConfigEntry>)> = names
            .iter()
            .map(|name| {
                (
                    ConfigResource {
                        kind: ResourceKind::Topic,
                        name: name.clone(),
                    },
                    vec![ConfigEntry {
                        name: "retention.ms".to_string(),
                        value: "86400000".to_string(),
                    }],
                )
            })
            .collect();
        let altered = client.alter_configs(alterations, &options);
        alters.record(altered.all().get().await.is_ok());

        // Describe everything back, awaiting all handles concurrently.
        let described = client.describe_configs(
            names
                .iter()
                .map(|name| ConfigResource {
                    kind: ResourceKind::Topic,
                    name: name.clone(),
                })
                .collect(),
            &options,
        );
        let outcomes = join_all(
            described
                .results()
                .iter()
                .map(|(_, handle)| handle.clone())
                .map(|handle| async move { handle.get().await }),
        )
        .await;
        for outcome in outcomes {
            describes.record(outcome.is_ok());
        }

        // Tear the round's topics back down.
        let deleted = client.delete_topics(names, &options);
        deletes.record(deleted.all().get().await.is_ok());

        if (round + 1) % 10 == 0 {
            tracing::info!(round = round + 1, "round complete");
        }
    }

    // Exercise the ACL paths once per run.
    let describe = client.describe_acls(AclBindingFilter::any(), &options);
    describe
        .bindings()
        .get()
        .await
        .context("describe_acls failed")?;

    client.close().await;

    let elapsed = started.elapsed();
    let total = creates.ok + creates.failed + alters.ok + alters.failed + describes.ok
        + describes.failed + deletes.ok + deletes.failed;
    let per_sec = if elapsed.as_secs_f64() > 0.0 {
        total as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    println!("workload finished in {elapsed:?} ({per_sec:.0} ops/s)");
    println!("  create_topics  ok={} failed={}", creates.ok, creates.failed);
    println!("  alter_configs  ok={} failed={}", alters.ok, alters.failed);
    println!("  describe_cfgs  ok={} failed={}", describes.ok, describes.failed);
    println!("  delete_topics  ok={} failed={}", deletes.ok, deletes.failed);

    anyhow::ensure!(
        creates.failed == 0 && deletes.failed == 0,
        "unexpected failures under churn; inspect logs with RUST_LOG=debug"
    );
    Ok(())
}
