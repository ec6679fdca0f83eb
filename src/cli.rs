//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::recording_gateway::RecordingGateway;
use crate::domain::config_validation::{
    build_data_config, build_strategy_config, validate_data_config, validate_strategy_config,
};
use crate::domain::engine::{replay, Engine, RunStats};
use crate::domain::error::TraderError;
use crate::domain::metrics::Metrics;
use crate::domain::position::CloseReason;
use crate::domain::strategy::StrategyConfig;
use crate::domain::trend::VolumeFilter;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "mtftrader", about = "Multi-timeframe trend-following backtester")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. info, debug)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay historical bars through the strategy
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [report] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and print the resolved parameters
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the bar series available in the data folder
    ListSeries {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSeries { config } => run_list_series(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

fn fail(err: &TraderError) -> ExitCode {
    if err.is_data_problem() {
        error!(error = %err, "data problem, run aborted");
    }
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    FileConfigAdapter::from_file(path)
}

/// `[report] output_dir`, unless overridden on the command line.
pub fn resolve_output_dir(adapter: &dyn ConfigPort, cli_override: Option<&Path>) -> PathBuf {
    cli_override.map(Path::to_path_buf).unwrap_or_else(|| {
        adapter
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .map(|s| PathBuf::from(s.trim()))
            .unwrap_or_else(|| PathBuf::from("results"))
    })
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> Result<(), TraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_data_config(&adapter)?;
    validate_strategy_config(&adapter)?;

    let data = build_data_config(&adapter)?;
    let strategy = build_strategy_config(&adapter)?;
    let output_dir = resolve_output_dir(&adapter, output);

    let source = CsvAdapter::new(data.folder.clone());
    let slow = source.fetch_bars(&data.symbol, data.slow_timeframe, data.start, data.end)?;
    let fast = source.fetch_bars(&data.symbol, data.fast_timeframe, data.start, data.end)?;
    eprintln!(
        "Loaded {} {} bars and {} {} bars for {}",
        slow.len(),
        data.slow_timeframe,
        fast.len(),
        data.fast_timeframe,
        data.symbol
    );

    let sink = CsvReportAdapter::create(&output_dir, strategy.risk.pip_value)?;
    let mut engine = Engine::new(strategy, RecordingGateway::new(), sink)?;
    info!(symbol = %data.symbol, "replay started");
    replay(&mut engine, &slow, &fast)?;
    let metrics = engine.finish()?;

    print_summary(&metrics, engine.stats());
    eprintln!("\nReport written to: {}", output_dir.display());
    Ok(())
}

fn print_summary(metrics: &Metrics, stats: &RunStats) {
    eprintln!("\n=== Run ===");
    eprintln!("Slow bars:        {}", stats.slow_bars);
    eprintln!("Fast bars:        {}", stats.fast_bars);
    eprintln!("Signals:          {}", stats.signals);
    eprintln!("Opened:           {}", stats.opened);
    eprintln!("Cap rejections:   {}", stats.rejected_cap);
    eprintln!("Invalid signals:  {}", stats.rejected_invalid);

    eprintln!("\n=== Trades ===");
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Winning Trades:   {}", metrics.trades_won);
    eprintln!("Losing Trades:    {}", metrics.trades_lost);
    eprintln!("Breakeven Trades: {}", metrics.trades_breakeven);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Total P&L:        {:.1} pips", metrics.total_pnl_pips);
    eprintln!("Average Win:      {:.1} pips", metrics.avg_win_pips);
    eprintln!("Average Loss:     {:.1} pips", metrics.avg_loss_pips);
    eprintln!("Largest Win:      {:.1} pips", metrics.largest_win_pips);
    eprintln!("Largest Loss:     {:.1} pips", metrics.largest_loss_pips);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Max Drawdown:     {:.1} pips", metrics.max_drawdown_pips);
    eprintln!("Max Consec. Wins: {}", metrics.max_consecutive_wins);
    eprintln!("Max Consec. Loss: {}", metrics.max_consecutive_losses);
    eprintln!(
        "Exits:            TP {} / SL {} / Manual {}",
        metrics.exit_count(CloseReason::TakeProfit),
        metrics.exit_count(CloseReason::StopLoss),
        metrics.exit_count(CloseReason::Manual)
    );
}

fn run_validate(config_path: &Path) -> Result<(), TraderError> {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_data_config(&adapter)?;
    validate_strategy_config(&adapter)?;

    let data = build_data_config(&adapter)?;
    let strategy = build_strategy_config(&adapter)?;

    eprintln!("\nData:");
    eprintln!("  folder: {}", data.folder.display());
    eprintln!(
        "  series: {} {} (slow) / {} (fast)",
        data.symbol, data.slow_timeframe, data.fast_timeframe
    );
    if data.start.is_some() || data.end.is_some() {
        let fmt = |t: Option<chrono::NaiveDateTime>| t.map_or("-".to_string(), |t| t.to_string());
        eprintln!("  range:  {} .. {}", fmt(data.start), fmt(data.end));
    }
    print_strategy(&strategy);
    eprintln!(
        "\nReport:\n  output_dir: {}",
        resolve_output_dir(&adapter, None).display()
    );
    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn print_strategy(strategy: &StrategyConfig) {
    let trend = &strategy.trend;
    eprintln!("\nTrend:");
    eprintln!("  band: {} bars, k = {}", trend.band_lookback, trend.band_k);
    match trend.volume_filter {
        VolumeFilter::Relative { multiplier } => {
            eprintln!("  volume: >= {multiplier} x average of prior window")
        }
        VolumeFilter::Absolute { up, down } => eprintln!("  volume: > {up} (up) / > {down} (down)"),
        VolumeFilter::Disabled => eprintln!("  volume: no filter"),
    }
    eprintln!("  hold policy: {:?}", trend.hold_policy);

    let entry = &strategy.entry;
    eprintln!("\nEntry:");
    eprintln!(
        "  EMA({}) +/- {} pips, reference price {:?}",
        entry.ema_period, entry.pip_threshold, entry.entry_price
    );

    let risk = &strategy.risk;
    eprintln!("\nRisk:");
    eprintln!("  TP {} pips / SL {} pips", risk.tp_pips, risk.sl_pips);
    eprintln!("  max open positions: {}", risk.max_concurrent_positions);
    eprintln!("  pip value: {}", risk.pip_value);
}

fn run_list_series(config_path: &Path) -> Result<(), TraderError> {
    let adapter = load_config(config_path)?;
    let data = build_data_config(&adapter)?;
    let series = CsvAdapter::new(data.folder.clone()).list_series()?;
    if series.is_empty() {
        eprintln!("No series found in {}", data.folder.display());
        return Ok(());
    }
    for (symbol, timeframe) in &series {
        println!("{symbol} {timeframe}");
    }
    eprintln!("{} series found", series.len());
    Ok(())
}
