use std::time::Duration;

use anyhow::{anyhow, Context};
use motherlode_api::prelude::*;
use motherlode_client::{
    rpc::or_fallback, ClientConfig, GameAction, GameSession, RemoteStateClient, RoundClock,
    SubmissionStage, SubmitError, SystemClock, TransactionSigner, TransactionSubmitter,
};
use tracing_subscriber::{fmt, EnvFilter};

mod signer;

use signer::KeypairSigner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    let client = RemoteStateClient::new(&config)?;
    let command = std::env::var("COMMAND").context("Missing COMMAND env var")?;
    match command.as_str() {
        "address" => log_address()?,
        "round" => log_round(&client).await?,
        "clock" => log_clock(&client, &config).await?,
        "board" | "grid" => log_board(&client).await?,
        "game" => log_game(&client).await?,
        "motherlode" => log_motherlode(&client).await?,
        "fees" => log_fees(&client).await?,
        "results" => log_results(&client).await?,
        "balance" => log_balance(&client, &config).await?,
        "miner" => log_miner(&client).await?,
        "automation" => log_automation(&client).await?,
        "watch" => watch(client, &config).await?,
        "deploy" => deploy(client, config).await?,
        "enable_automation" => enable_automation(client, config).await?,
        "disable_automation" => submit(client, config, GameAction::DisableAutomation).await?,
        "top_up" => top_up(client, config).await?,
        "faucet" => submit(client, config, GameAction::TestFaucet).await?,
        other => return Err(anyhow!("Unknown COMMAND {other}")),
    }
    Ok(())
}

/// `ADDRESS` if set, otherwise the keypair's account.
fn wallet() -> anyhow::Result<Address> {
    match std::env::var("ADDRESS") {
        Ok(address) => address.parse().context("Invalid ADDRESS"),
        Err(_) => Ok(KeypairSigner::from_env()?.address()),
    }
}

fn env_amount(var: &str) -> anyhow::Result<Amount> {
    let value = std::env::var(var).with_context(|| format!("Missing {var} env var"))?;
    value.parse().with_context(|| format!("Invalid {var}"))
}

fn log_address() -> anyhow::Result<()> {
    let signer = KeypairSigner::from_env()?;
    println!("Address: {}", signer.address());
    Ok(())
}

async fn log_round(client: &RemoteStateClient) -> anyhow::Result<()> {
    let round = client.fetch_round_status().await?;
    println!("Round");
    println!("  Id: {}", round.round);
    println!("  Start: {}", round.round_start);
    println!("  End: {}", round.round_end);
    println!("  Duration: {} sec", round.duration());
    println!("  Remaining: {} sec", round.reported_remaining);
    println!("  Ended: {}", round.ended);
    Ok(())
}

/// Syncs the round clock a few times and prints the countdown with drift.
async fn log_clock(client: &RemoteStateClient, config: &ClientConfig) -> anyhow::Result<()> {
    let samples: u32 = std::env::var("SAMPLES")
        .ok()
        .map(|s| s.parse::<u32>())
        .transpose()
        .context("Invalid SAMPLES")?
        .unwrap_or(3);
    let mut clock = RoundClock::new(
        SystemClock::new(),
        config.drift_threshold_secs,
        config.stale_after_failures,
    );
    for _ in 0..samples {
        let report = clock.sync(client.fetch_round_status()).await;
        if let Some(err) = &report.error {
            println!("Sync failed: {err}");
        }
        let remaining = clock.tick();
        println!("Clock");
        println!("  Round: {}", remaining.round);
        println!("  Remaining: {} sec", remaining.remaining);
        println!("  Ended: {}", remaining.ended);
        println!("  Round end: {}", clock.snapshot().round_end);
        println!("  Offset: {:.3} sec", clock.offset().unwrap_or_default());
        match clock.last_drift() {
            Some(drift) => {
                println!("  Drift: {drift:.3} sec (recalibrated: {})", report.recalibrated)
            }
            None => println!("  Drift: n/a"),
        }
        if let Some(transition) = report.transition {
            println!("  Transition: {} -> {}", transition.from, transition.to);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}

async fn log_board(client: &RemoteStateClient) -> anyhow::Result<()> {
    let (round, grid) = futures::join!(client.fetch_round_status(), client.fetch_grid());
    let grid = grid?;
    print_board(round.ok().as_ref(), &grid);
    Ok(())
}

fn print_board(round: Option<&RoundSnapshot>, grid: &Grid) {
    println!("Board");
    if let Some(round) = round {
        println!("  Round: {}", round.round);
        println!("  Time remaining: {} sec", round.reported_remaining);
    }
    println!("  Total deployed: {}", grid.total_deployed());
    for row in grid.cells().chunks(GRID_SIDE) {
        let line: Vec<String> = row
            .iter()
            .map(|cell| {
                let marker = if cell.is_winning { "*" } else { " " };
                format!(
                    "{:>4}{marker}{:>12} ({:>3})",
                    cell.block_number().to_string(),
                    cell.total_deployed.to_string(),
                    cell.participant_count
                )
            })
            .collect();
        println!("  {}", line.join(" |"));
    }
    let winners = grid.winning_blocks();
    if !winners.is_empty() {
        let winners: Vec<String> = winners.iter().map(ToString::to_string).collect();
        println!("  Winning: {}", winners.join(", "));
    }
}

async fn log_game(client: &RemoteStateClient) -> anyhow::Result<()> {
    let (state, total_rounds) =
        futures::try_join!(client.fetch_game_state(), client.fetch_total_rounds())?;
    println!("Game");
    println!("  Round: {}", state.round);
    println!("  Total deployed: {}", state.total_deployed);
    println!("  Motherlode: {}", state.motherlode);
    println!("  Active: {}", state.is_active);
    println!("  Total rounds: {}", total_rounds);
    Ok(())
}

async fn log_motherlode(client: &RemoteStateClient) -> anyhow::Result<()> {
    let pool = client.fetch_motherlode().await?;
    println!("Motherlode: {pool} MORE");
    Ok(())
}

async fn log_fees(client: &RemoteStateClient) -> anyhow::Result<()> {
    let fees = client.fetch_protocol_fees().await?;
    println!("Protocol fees");
    println!("  Native: {}", fees.native);
    println!("  MORE: {}", fees.more);
    Ok(())
}

async fn log_results(client: &RemoteStateClient) -> anyhow::Result<()> {
    let round = match std::env::var("ID") {
        Ok(id) => Some(id.parse::<u64>().context("Invalid ID")?),
        Err(_) => None,
    };
    let result = client.fetch_round_result(round).await?;
    println!("Round result");
    println!("{result:#?}");
    Ok(())
}

async fn log_balance(client: &RemoteStateClient, config: &ClientConfig) -> anyhow::Result<()> {
    let address = wallet()?;
    let (native, more) = futures::try_join!(
        client.fetch_primary_balance(address),
        client.fetch_reward_balance(address)
    )?;
    println!("Balance");
    println!("  Address: {address}");
    println!("  Native: {native}");
    println!("  MORE: {more}");
    println!("  Explorer: {}", config.account_explorer_url(&address));
    Ok(())
}

async fn log_miner(client: &RemoteStateClient) -> anyhow::Result<()> {
    let address = wallet()?;
    let miner = client.fetch_miner_stats(address).await?;
    println!("Miner");
    println!("  Address: {address}");
    println!("  Total deployed: {}", miner.total_deployed);
    println!("  Reward earned: {}", miner.reward_earned);
    println!("  Rounds won: {}", miner.rounds_won);
    println!("  Blocks deployed: {}", miner.blocks_deployed_count);
    Ok(())
}

async fn log_automation(client: &RemoteStateClient) -> anyhow::Result<()> {
    let address = wallet()?;
    let (automation, can_execute) = futures::join!(
        client.fetch_automation(address),
        client.fetch_can_execute_automation(address)
    );
    let can_execute = or_fallback(can_execute, false, "can_execute_automation");
    let Some(automation) = automation? else {
        println!("Automation: not configured");
        return Ok(());
    };
    println!("Automation");
    println!("  Active: {}", automation.active);
    println!("  Strategy: {}", automation.strategy);
    println!("  Staked: {}", automation.staked_balance);
    println!("  Per block: {}", automation.amount_per_block);
    println!("  Last deployed round: {}", automation.last_deployed_round);
    println!("  Total deployments: {}", automation.total_deployments);
    println!("  Rounds remaining: {}", automation.estimated_rounds_remaining);
    println!("  Executable now: {can_execute}");
    Ok(())
}

/// Runs a live session and prints the countdown until interrupted.
async fn watch(client: RemoteStateClient, config: &ClientConfig) -> anyhow::Result<()> {
    let wallet = std::env::var("ADDRESS")
        .ok()
        .map(|a| a.parse::<Address>())
        .transpose()
        .context("Invalid ADDRESS")?;
    let session = GameSession::start(client, config, wallet)?;
    let mut view = session.view();
    tracing::info!(wallet = ?session.wallet(), "watching rounds, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = view.round.changed() => {
                if changed.is_err() {
                    break;
                }
                let remaining = *view.round.borrow_and_update();
                let grid_total = view.grid.borrow().total_deployed();
                let motherlode = *view.motherlode.borrow();
                let stale = if remaining.stale { " (stale)" } else { "" };
                let status = if remaining.ended { "ended" } else { "live" };
                println!(
                    "round {} {status}: {:>3}s left{stale} | deployed {grid_total} \
                     | motherlode {motherlode}",
                    remaining.round, remaining.remaining
                );
            }
        }
    }
    tracing::info!("stopping session");
    session.shutdown().await;
    Ok(())
}

async fn deploy(client: RemoteStateClient, config: ClientConfig) -> anyhow::Result<()> {
    let amount_per_block = env_amount("AMOUNT")?;
    let blocks = std::env::var("BLOCKS").context("Missing BLOCKS env var")?;
    let blocks = parse_block_list(&blocks).context("Invalid BLOCKS")?;
    submit(
        client,
        config,
        GameAction::Deploy {
            blocks,
            amount_per_block,
        },
    )
    .await
}

async fn enable_automation(client: RemoteStateClient, config: ClientConfig) -> anyhow::Result<()> {
    let stake = env_amount("STAKE")?;
    let amount_per_block = env_amount("AMOUNT")?;
    let strategy: Strategy = std::env::var("STRATEGY")
        .unwrap_or_else(|_| "random".to_string())
        .parse()
        .context("Invalid STRATEGY")?;
    let custom_blocks = match std::env::var("BLOCKS") {
        Ok(blocks) => parse_block_list(&blocks).context("Invalid BLOCKS")?,
        Err(_) => vec![],
    };
    submit(
        client,
        config,
        GameAction::EnableAutomation {
            stake,
            amount_per_block,
            strategy,
            custom_blocks,
        },
    )
    .await
}

async fn top_up(client: RemoteStateClient, config: ClientConfig) -> anyhow::Result<()> {
    let amount = env_amount("AMOUNT")?;
    submit(client, config, GameAction::AddAutomationStake { amount }).await
}

async fn submit(
    client: RemoteStateClient,
    config: ClientConfig,
    action: GameAction,
) -> anyhow::Result<()> {
    let signer = KeypairSigner::from_env()?;
    println!("Signer: {}", signer.address());
    let submitter = TransactionSubmitter::new(client, config, signer);
    let result = submitter
        .submit_with_progress(&action, |stage| match stage {
            SubmissionStage::Built => println!("  built {}", action.name()),
            SubmissionStage::Signed => println!("  signed"),
            SubmissionStage::Submitted { hash } => println!("  submitted {hash}"),
            SubmissionStage::Confirmed { .. } => println!("  confirmed"),
            SubmissionStage::Failed => {}
        })
        .await;
    match result {
        Ok(confirmation) => {
            println!("Transaction confirmed");
            println!("  Hash: {}", confirmation.hash);
            println!("  Version: {}", confirmation.version);
            println!("  Gas used: {}", confirmation.gas_used);
            println!("  Explorer: {}", confirmation.explorer_url);
            Ok(())
        }
        Err(err) => Err(report(err)),
    }
}

fn report(err: SubmitError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
