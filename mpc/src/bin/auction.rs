//! Scenario driver: runs one sealed second-price auction over the simulated
//! network and prints per-party results next to the cleartext reference.

use clap::Parser;
use sealbid_mpc::harness::{
    reference_auction, run_auction, AuctionConfig, N_PARTIES,
};
use sealbid_network::sim::DelayModel;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "auction", about = "Sealed second-price auction via asynchronous MPC")]
struct Args {
    /// Comma-separated bids for parties 1..=4, each in [0, 32), all distinct.
    #[arg(long, value_delimiter = ',', default_value = "5,20,13,7")]
    bids: Vec<u32>,

    /// Party whose links are severed (omission fault).
    #[arg(long)]
    omit: Option<usize>,

    /// Seed for a reproducible run; fresh entropy when absent.
    #[arg(long)]
    seed: Option<u64>,

    /// Mean message delay in milliseconds (exponential model).
    #[arg(long, default_value_t = 2.0)]
    delay_mean_ms: f64,

    /// Runtime budget in seconds before parties are torn down.
    #[arg(long, default_value_t = 30)]
    budget_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if args.bids.len() != N_PARTIES {
        eprintln!("need exactly {N_PARTIES} bids");
        return ExitCode::FAILURE;
    }

    let mut bids = [0u32; N_PARTIES];
    bids.copy_from_slice(&args.bids);
    let mut config = AuctionConfig::new(bids).with_delay(DelayModel::Exponential {
        mean: Duration::from_secs_f64(args.delay_mean_ms / 1000.0),
    });
    config.omitting_party = args.omit;
    config.seed = args.seed;
    config.budget = Duration::from_secs(args.budget_secs);

    println!("=== sealed second-price auction ===");
    println!("bids: {:?}", config.bids);
    if let Some(omit) = args.omit {
        println!("omitting party: {omit}");
    }

    let report = match run_auction(config.clone()).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("scenario rejected: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("--- results ---");
    let mut realized_active = None;
    for (party, outcome) in &report.outcomes {
        match outcome {
            Some(outcome) => {
                realized_active.get_or_insert_with(|| outcome.active_set.clone());
                let value = outcome.output_as_int();
                if value > 0 {
                    println!("  party {party}: WINNER, pays {value}");
                } else {
                    println!("  party {party}: not the winner (output 0)");
                }
            }
            None => println!("  party {party}: no output (omitted or out of budget)"),
        }
    }

    if let Some(active) = &realized_active {
        if let Some((winner, price)) = reference_auction(&config.bids, active.iter().copied()) {
            println!("  expected: party {winner} wins, pays {price} (active set {active:?})");
        }
    }

    println!("--- metrics ---");
    println!("  messages sent:      {}", report.messages_sent);
    println!("  messages dropped:   {}", report.messages_dropped);
    for (kind, count) in &report.counts_by_kind {
        println!("    {kind:<15} {count}");
    }
    println!("  beacon invocations: {}", report.beacon_invocations);
    println!("  multiplication gates: {}", report.multiplication_gates);
    println!("  elapsed: {:?}", report.elapsed);

    if report.all_honest_completed(args.omit) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
