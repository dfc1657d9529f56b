use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{Rng, RngCore};
use sequencer::{
    assembler::{AssemblerService, BlockAssembler, SlotClock, tick_channel},
    config::SequencerConfig,
    context::NodeContext,
    crypto::hash::short_hex,
    logging,
    mempool::{SubmitError, TransactionPool},
    poh::{PohEngine, PohTicker},
    state::transaction::{AccountMeta, Instruction, SIGNATURE_LEN, Transaction},
    storage::ChainStore,
};
use slog::{Level, Logger, o};

#[derive(Parser)]
#[command(name = "sequencer-node", about = "Proof-of-History sequencer node", version)]
struct Cli {
    /// Path to a TOML config file; defaults plus SEQUENCER_* env vars when omitted
    #[arg(long, short, global = true, env = "SEQUENCER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (critical, error, warning, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sequencer
    Run {
        /// Stop after this many seconds (runs until killed when omitted)
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Submit this many synthetic transactions per second
        #[arg(long, default_value = "0")]
        demo_tps: u64,
    },
    /// Print the stored chain checkpoint and latest block
    Inspect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = Level::from_str(&cli.log_level)
        .map_err(|()| anyhow::anyhow!("Unknown log level: {}", cli.log_level))?;
    let logger = logging::create_logger(level);

    let config = match &cli.config {
        Some(path) => SequencerConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SequencerConfig::from_env()?,
    };

    match cli.command {
        Command::Run {
            duration_secs,
            demo_tps,
        } => run(config, duration_secs.map(Duration::from_secs), demo_tps, logger),
        Command::Inspect => inspect(&config, logger),
    }
}

fn run(
    config: SequencerConfig,
    duration: Option<Duration>,
    demo_tps: u64,
    logger: Logger,
) -> Result<()> {
    let context = NodeContext::init(&config.node, logger.new(o!("component" => "context")))?;
    let shutdown = context.shutdown_flag();

    let store = Arc::new(ChainStore::from_config(
        &config.storage,
        logger.new(o!("component" => "storage")),
    )?);
    let engine = Arc::new(
        PohEngine::recover(
            config.poh.clone(),
            store.clone(),
            logger.new(o!("component" => "poh")),
        )?
        .with_signer(context.identity()),
    );
    let pool = Arc::new(TransactionPool::new(&config.pool)?);

    let first_slot = match store.get_latest_block()? {
        Some(block) => block.slot() + 1,
        None => engine.current_slot() + 1,
    };

    let mut ticker = match config.poh.tick_interval() {
        Some(interval) => Some(PohTicker::spawn(
            Arc::clone(&engine),
            interval,
            Arc::clone(&shutdown),
            logger.new(o!("component" => "ticker")),
        )?),
        None => None,
    };

    let (tick_producer, tick_consumer) = tick_channel();
    let mut clock = SlotClock::spawn(
        first_slot,
        config.assembler.slot_duration(),
        tick_producer,
        Arc::clone(&shutdown),
        logger.new(o!("component" => "clock")),
    )?;

    let assembler = BlockAssembler::new(
        config.assembler.clone(),
        Arc::clone(&pool),
        Arc::clone(&engine),
        store.clone(),
        store.clone(),
        logger.new(o!("component" => "assembler")),
    );
    let (mut service, mut channels) = AssemblerService::spawn(
        assembler,
        tick_consumer,
        Arc::clone(&shutdown),
        logger.new(o!("component" => "assembler")),
    )?;

    slog::info!(
        logger,
        "Sequencer running";
        "first_slot" => first_slot,
        "chain_height" => engine.current_height(),
        "shards" => config.pool.shard_count,
        "demo_tps" => demo_tps,
    );

    let started = Instant::now();
    let mut rng = rand::thread_rng();
    let mut submitted = 0u64;
    let mut pool_full = 0u64;
    while !context.is_shutting_down() && duration.is_none_or(|d| started.elapsed() < d) {
        if demo_tps > 0 {
            let due = (started.elapsed().as_secs_f64() * demo_tps as f64) as u64;
            while submitted < due {
                match pool.submit(demo_transaction(&mut rng)) {
                    Ok(_) => {}
                    Err(SubmitError::ShardFull { .. }) => pool_full += 1,
                    Err(e) => slog::warn!(logger, "Demo transaction rejected"; "error" => %e),
                }
                submitted += 1;
            }
        }

        while let Ok(outcome) = channels.outcome_consumer.pop() {
            context.observe_outcome(&outcome);
        }

        if engine.is_halted() {
            slog::crit!(logger, "Chain halted, stopping node");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    clock.shutdown();
    service.shutdown();
    if let Some(ticker) = ticker.as_mut() {
        ticker.shutdown();
    }

    let stats = pool.stats();
    slog::info!(
        logger,
        "Sequencer stopped";
        "chain_height" => engine.current_height(),
        "chain_hash" => short_hex(&engine.current_hash()),
        "blocks" => store.block_count()?,
        "pool_live" => stats.live,
        "pool_selected" => stats.selected,
        "demo_submitted" => submitted,
        "demo_pool_full" => pool_full,
    );
    context.shutdown();
    Ok(())
}

fn inspect(config: &SequencerConfig, logger: Logger) -> Result<()> {
    let store = ChainStore::from_config(&config.storage, logger.clone())?;
    match store.get_latest_checkpoint()? {
        Some(record) => {
            let verified = PohEngine::verify_records(std::slice::from_ref(&record)).is_ok();
            slog::info!(
                logger,
                "Latest checkpoint";
                "height" => record.chain_height,
                "hash" => short_hex(&record.current_hash),
                "slot" => record.slot,
                "verified" => verified,
            );
        }
        None => slog::info!(logger, "No checkpoint stored"),
    }
    match store.get_latest_block()? {
        Some(block) => slog::info!(
            logger,
            "Latest block";
            "slot" => block.slot(),
            "hash" => short_hex(&block.hash()),
            "tx_count" => block.header.tx_count,
            "chain_height" => block.header.chain_height,
        ),
        None => slog::info!(logger, "No block stored"),
    }
    slog::info!(logger, "Stored blocks"; "count" => store.block_count()?);
    Ok(())
}

/// A random well-formed transfer for load generation.
fn demo_transaction(rng: &mut impl RngCore) -> Transaction {
    let mut signature = [0u8; SIGNATURE_LEN];
    rng.fill_bytes(&mut signature);
    let mut payer = [0u8; 32];
    rng.fill_bytes(&mut payer);
    let mut recipient = [0u8; 32];
    rng.fill_bytes(&mut recipient);
    let mut recent_blockhash = [0u8; 32];
    rng.fill_bytes(&mut recent_blockhash);
    let fee = rng.gen_range(0..10_000u64);

    Transaction::new(
        vec![signature],
        vec![
            AccountMeta::new(payer, true, true),
            AccountMeta::new(recipient, false, true),
        ],
        vec![Instruction {
            program_id: [1u8; 32],
            account_indices: vec![0, 1],
            data: fee.to_le_bytes().to_vec(),
        }],
        recent_blockhash,
        fee,
    )
}
