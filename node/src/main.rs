use anyhow::{Context, Result};
use clap::Parser;
use qchess_execution::{Ledger, Memory, TracingSink};
use qchess_node::{run_script, Config, LoggingTreasury, MatchReport, Script};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "qchess-node")]
#[command(about = "Run a quantum chess match script against a local game ledger")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML match script to execute
    #[arg(long)]
    script: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    dry_run: bool,

    /// Overrides `log_level` from the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Print final boards as JSON instead of ASCII
    #[arg(long)]
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read config file {}", path.display()))?;
    serde_yaml::from_str(&contents).context("Could not parse config file")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config
    let mut config = load_config(args.config.as_ref())?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    let config = config.validate().context("Invalid config")?;

    // Setup logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    if args.dry_run {
        println!("{config:#?}");
        println!("config ok");
        return Ok(());
    }

    let path = args
        .script
        .context("Either --script or --dry-run must be provided")?;
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Could not read script {}", path.display()))?;
    let script: Script = serde_yaml::from_str(&contents).context("Could not parse script")?;
    info!(
        script = %path.display(),
        players = script.players.len(),
        steps = script.steps.len(),
        "running match script"
    );

    let ledger = Ledger::new(
        config.ledger_config(),
        Memory::default(),
        LoggingTreasury,
        TracingSink,
    );
    let report = run_script(&ledger, &script, config.default_timeout_secs)
        .await
        .context("Match script failed")?;
    print_summary(&ledger, &report, args.json).await
}

async fn print_summary(
    ledger: &Ledger<Memory, LoggingTreasury, TracingSink>,
    report: &MatchReport,
    json: bool,
) -> Result<()> {
    for step in &report.steps {
        match &step.rejection {
            Some(reason) => println!("#{} {} {}: rejected ({reason})", step.step, step.player, step.action),
            None => println!(
                "#{} {} {}: {} event(s)",
                step.step,
                step.player,
                step.action,
                step.events.len()
            ),
        }
    }

    for id in &report.games {
        let game = ledger.game(*id).await?;
        if json {
            let snapshot = serde_json::json!({
                "game": id,
                "status": game.status.as_str(),
                "moves": game.moves.len(),
                "board": game.board,
            });
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            continue;
        }
        println!();
        println!(
            "game {id}: {} after {} move(s)",
            game.status.as_str(),
            game.moves.len()
        );
        print!("{}", game.board.render());
    }

    println!();
    for (name, public) in &report.players {
        println!("{name}: balance {}", ledger.balance(public).await?);
    }
    Ok(())
}
