//! CLI definition and dispatch.
//!
//! Every subcommand reads one INI file, reports its stages on stderr and
//! maps failures to an exit code through `PairtraderError`.

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceSource;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestResult, ExitRules, ZScorePairBacktest};
use crate::domain::config_validation::{
    double, float_list, optional_date, optional_float_list, required_date, validate_data_config,
    validate_grid_config, validate_ranking_config, validate_strategy_config,
};
use crate::domain::error::PairtraderError;
use crate::domain::grid_search::{GridResult, GridSpec, Objective, grid_search};
use crate::domain::pair_ranker::{PairCandidate, PairRanker, select_pair};
use crate::domain::price_table::PriceTable;
use crate::domain::trades::{format_trade_table, summarize_extreme_trades};
use crate::domain::universe::{load_universe, parse_tickers, split_train_test};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_source::PriceSource;
use crate::ports::report_port::{EquityRow, Report, ReportPort};

#[derive(Parser, Debug)]
#[command(name = "pairtrader", about = "Pairs-trading research toolkit")]
pub struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank every pair of the configured universe
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of ranked pairs to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Backtest the configured or top-ranked pair
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep entry/exit/stop parameters for the selected pair
    GridSearch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of grid rows to print
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the tickers a price source offers
    ListTickers {
        /// Price directory or wide CSV file
        #[arg(short, long)]
        source: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Rank {
            config,
            output,
            top,
        } => run_rank(&config, output.as_deref(), top),
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::GridSearch {
            config,
            output,
            top,
        } => run_grid_search(&config, output.as_deref(), top),
        Command::Validate { config } => run_validate(&config),
        Command::ListTickers { source, config } => {
            run_list_tickers(source.as_deref(), config.as_deref())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PairtraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// `[data]` section after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub source: PathBuf,
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub test_start: Option<NaiveDate>,
    pub test_end: Option<NaiveDate>,
}

pub fn build_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, PairtraderError> {
    validate_data_config(config)?;
    let source = config
        .get_trimmed("data", "source")
        .map(PathBuf::from)
        .ok_or_else(|| PairtraderError::ConfigMissing {
            section: "data".into(),
            key: "source".into(),
        })?;
    let raw = config.get_string("data", "tickers").unwrap_or_default();
    let tickers = parse_tickers(&raw).map_err(|e| PairtraderError::ConfigInvalid {
        section: "data".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })?;
    Ok(DataSettings {
        source,
        tickers,
        start: required_date(config, "data", "start_date")?,
        end: required_date(config, "data", "end_date")?,
        test_start: optional_date(config, "data", "test_start")?,
        test_end: optional_date(config, "data", "test_end")?,
    })
}

pub fn build_ranker(config: &dyn ConfigPort) -> Result<PairRanker, PairtraderError> {
    validate_ranking_config(config)?;
    let beta_window = config.get_int("ranking", "beta_window", 60) as usize;
    PairRanker::new(config.get_bool("ranking", "use_logs", true), beta_window)
}

/// Engine parameters; the pair comes from the caller.
pub fn build_backtest(
    config: &dyn ConfigPort,
    stock1: &str,
    stock2: &str,
) -> Result<ZScorePairBacktest, PairtraderError> {
    validate_strategy_config(config)?;
    let defaults = ZScorePairBacktest::new(stock1, stock2);
    Ok(ZScorePairBacktest {
        entry_z: double(config, "strategy", "entry_z")?.unwrap_or(defaults.entry_z),
        exit_z: double(config, "strategy", "exit_z")?.unwrap_or(defaults.exit_z),
        tx_cost_per_leg: double(config, "strategy", "tx_cost_per_leg")?
            .unwrap_or(defaults.tx_cost_per_leg),
        use_rolling_z: config.get_bool("strategy", "use_rolling_z", defaults.use_rolling_z),
        z_window: config.get_int("strategy", "z_window", defaults.z_window as i64) as usize,
        ..defaults
    })
}

pub fn build_exit_rules(config: &dyn ConfigPort) -> Result<ExitRules, PairtraderError> {
    validate_strategy_config(config)?;
    let max_bars_in_trade = match config.get_trimmed("strategy", "max_bars_in_trade") {
        None => None,
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| PairtraderError::ConfigInvalid {
            section: "strategy".into(),
            key: "max_bars_in_trade".into(),
            reason: format!("'{raw}' is not a positive integer"),
        })?),
    };
    Ok(ExitRules {
        stop_loss_pct: double(config, "strategy", "stop_loss_pct")?,
        take_profit_pct: double(config, "strategy", "take_profit_pct")?,
        max_bars_in_trade,
        close_at_end: config.get_bool("strategy", "close_at_end", false),
    })
}

/// Grids not named in `[grid]` keep their defaults.
pub fn build_grid_spec(config: &dyn ConfigPort) -> Result<GridSpec, PairtraderError> {
    validate_grid_config(config)?;
    let defaults = GridSpec::default();
    let objective = match config.get_trimmed("grid", "objective") {
        None => defaults.objective,
        Some(raw) => raw.parse::<Objective>()?,
    };
    let objective = match objective {
        Objective::SharpePenalized { dd_limit_pct } => Objective::SharpePenalized {
            dd_limit_pct: double(config, "grid", "dd_limit_pct")?.unwrap_or(dd_limit_pct),
        },
        other => other,
    };
    Ok(GridSpec {
        entry_z: float_list(config, "grid", "entry_z")?.unwrap_or(defaults.entry_z),
        exit_z: float_list(config, "grid", "exit_z")?.unwrap_or(defaults.exit_z),
        stop_loss: optional_float_list(config, "grid", "stop_loss")?
            .unwrap_or(defaults.stop_loss),
        take_profit: optional_float_list(config, "grid", "take_profit")?
            .unwrap_or(defaults.take_profit),
        max_bars_in_trade: build_exit_rules(config)?.max_bars_in_trade,
        objective,
    })
}

/// Prices loaded from the source and split into ranking and trading windows.
/// Without `test_start` both windows are the full table.
#[derive(Debug, Clone)]
pub struct PreparedPrices {
    pub train: PriceTable,
    pub test: PriceTable,
}

pub fn prepare_prices(
    source: &dyn PriceSource,
    data: &DataSettings,
) -> Result<PreparedPrices, PairtraderError> {
    eprintln!(
        "Loading {} tickers, {} to {}",
        data.tickers.len(),
        data.start,
        data.end
    );
    let universe = load_universe(source, &data.tickers, data.start, data.end)?;
    for skipped in &universe.skipped {
        eprintln!("warning: skipping {} ({})", skipped.ticker, skipped.reason);
    }
    eprintln!(
        "  Loaded: {} tickers, {} dates",
        universe.tickers().len(),
        universe.prices.len()
    );

    match data.test_start {
        Some(test_start) => {
            let (train, test) = split_train_test(&universe.prices, test_start, data.test_end)?;
            eprintln!(
                "  Split: {} train rows, {} test rows from {}",
                train.len(),
                test.len(),
                test_start
            );
            Ok(PreparedPrices { train, test })
        }
        None => Ok(PreparedPrices {
            train: universe.prices.clone(),
            test: universe.prices,
        }),
    }
}

pub fn rank_universe(
    ranker: &PairRanker,
    prices: &PriceTable,
) -> Result<Vec<PairCandidate>, PairtraderError> {
    let tickers: Vec<&str> = prices.tickers().iter().map(String::as_str).collect();
    eprintln!(
        "Ranking {} pairs (use_logs={}, beta_window={})",
        tickers.len() * tickers.len().saturating_sub(1) / 2,
        ranker.use_logs(),
        ranker.beta_window()
    );
    ranker.rank_pairs(prices, &tickers)
}

/// Configured `stock1`/`stock2`, or the pair at `pair_rank` in the training
/// ranking. The ranking is returned when it was computed.
pub fn choose_pair(
    config: &dyn ConfigPort,
    train: &PriceTable,
) -> Result<(String, String, Vec<PairCandidate>), PairtraderError> {
    if let (Some(s1), Some(s2)) = (
        config.get_trimmed("strategy", "stock1"),
        config.get_trimmed("strategy", "stock2"),
    ) {
        eprintln!("Using configured pair {s1} / {s2}");
        return Ok((s1, s2, Vec::new()));
    }

    let ranker = build_ranker(config)?;
    let ranked = rank_universe(&ranker, train)?;
    let position = usize::try_from(config.get_int("ranking", "pair_rank", 0)).map_err(|_| {
        PairtraderError::ConfigInvalid {
            section: "ranking".to_string(),
            key: "pair_rank".to_string(),
            reason: "must be >= 0".to_string(),
        }
    })?;
    let (a, b) = select_pair(&ranked, position)?;
    eprintln!("Selected pair #{position}: {a} / {b}");
    Ok((a, b, ranked))
}

pub fn format_ranking(ranked: &[PairCandidate], top: usize) -> String {
    let mut out = format!(
        "{:<4} {:<12} {:<12} {:>5} {:>8} {:>8} {:>8} {:>9}\n",
        "#", "A", "B", "score", "p", "beta", "beta_cv", "half_life"
    );
    for (i, c) in ranked.iter().take(top).enumerate() {
        out.push_str(&format!(
            "{:<4} {:<12} {:<12} {:>5} {:>8.4} {:>8.3} {:>8.3} {:>9.1}\n",
            i, c.ticker_a, c.ticker_b, c.score, c.p_value, c.beta, c.beta_cv, c.half_life
        ));
    }
    if ranked.len() > top {
        out.push_str(&format!("... ({} more)\n", ranked.len() - top));
    }
    out
}

pub fn format_grid(results: &[GridResult], top: usize) -> String {
    let opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |x| format!("{x:.2}"));
    let mut out = format!(
        "{:>6} {:>6} {:>6} {:>6} {:>8} {:>9} {:>8} {:>8}\n",
        "entry", "exit", "sl", "tp", "sharpe", "return", "max_dd", "score"
    );
    for r in results.iter().take(top) {
        out.push_str(&format!(
            "{:>6.2} {:>6.2} {:>6} {:>6} {:>8.4} {:>8.2}% {:>7.2}% {:>8.4}\n",
            r.entry_z,
            r.exit_z,
            opt(r.stop_loss_pct),
            opt(r.take_profit_pct),
            r.sharpe,
            r.total_return * 100.0,
            r.max_drawdown * 100.0,
            r.score
        ));
    }
    out
}

fn output_dir(cli_output: Option<&Path>, config: &dyn ConfigPort) -> Option<PathBuf> {
    cli_output
        .map(Path::to_path_buf)
        .or_else(|| config.get_trimmed("report", "output_dir").map(PathBuf::from))
}

fn write_report(report: &Report, dir: Option<&Path>) -> Result<(), PairtraderError> {
    let Some(dir) = dir else {
        return Ok(());
    };
    let written = CsvReportAdapter::new().write(report, dir)?;
    for path in &written {
        eprintln!("Report written to: {}", path.display());
    }
    Ok(())
}

fn open_source(data: &DataSettings) -> Result<CsvPriceSource, PairtraderError> {
    eprintln!("Reading prices from {}", data.source.display());
    CsvPriceSource::open(&data.source)
}

fn run_rank(config_path: &Path, output: Option<&Path>, top: usize) -> Result<(), PairtraderError> {
    // Stage 1: config
    let config = load_config(config_path)?;
    let data = build_data_settings(&config)?;
    let ranker = build_ranker(&config)?;

    // Stage 2: prices
    let source = open_source(&data)?;
    let prepared = prepare_prices(&source, &data)?;

    // Stage 3: rank on the training window
    let ranked = rank_universe(&ranker, &prepared.train)?;
    eprintln!("\n=== Ranked Pairs ===");
    eprint!("{}", format_ranking(&ranked, top));

    let report = Report {
        ranked_pairs: ranked,
        ..Report::default()
    };
    write_report(&report, output_dir(output, &config).as_deref())
}

fn print_stats(result: &BacktestResult) {
    let st = &result.stats;
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Hedge Ratio:      {:.4}", result.hedge_ratio);
    eprintln!("Days:             {}", st.n_days);
    eprintln!("Total Return:     {:.2}%", st.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", st.annualized_return * 100.0);
    eprintln!("Sharpe (daily):   {:.4}", st.sharpe_daily);
    eprintln!("Sharpe (annual):  {:.2}", st.sharpe_annual);
    eprintln!("Sortino:          {:.2}", st.sortino_annual);
    eprintln!(
        "Max Drawdown:     -{:.1}% ({} days)",
        st.max_drawdown * 100.0,
        st.max_drawdown_duration
    );
    eprintln!("Position Changes: {}", st.position_changes);
    eprintln!("Closed Trades:    {}", st.n_trades);
    eprintln!("Win Rate:         {:.1}%", st.positive_trade_rate * 100.0);
    if let Some(open) = &result.current_open_trade {
        eprintln!(
            "Open Trade:       {:?} since {}, {:+.2}% unrealized",
            open.position,
            open.since,
            open.unrealized_return * 100.0
        );
    }
    if let Some(last) = result.equity_close_now.as_ref().and_then(|c| c.last()) {
        eprintln!("Equity If Closed: {:.4}", last);
    }
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> Result<(), PairtraderError> {
    // Stage 1: config
    let config = load_config(config_path)?;
    let data = build_data_settings(&config)?;
    let rules = build_exit_rules(&config)?;

    // Stage 2: prices
    let source = open_source(&data)?;
    let prepared = prepare_prices(&source, &data)?;

    // Stage 3: pair selection on the training window
    let (stock1, stock2, ranked) = choose_pair(&config, &prepared.train)?;
    let engine = build_backtest(&config, &stock1, &stock2)?;

    // Stage 4: backtest on the trading window
    eprintln!(
        "Running backtest: {} / {}, entry_z={}, exit_z={}, {} dates",
        stock1,
        stock2,
        engine.entry_z,
        engine.exit_z,
        prepared.test.len()
    );
    let result = engine.execute(&prepared.test, &rules)?;
    print_stats(&result);

    // Stage 5: trades
    let max_rows = config.get_int("report", "max_rows", 20).max(0) as usize;
    let top_k = config.get_int("report", "top_k", 5).max(0) as usize;
    eprintln!("\n=== Trades ===");
    eprint!("{}", format_trade_table(&result.trades_table, max_rows));
    let extremes = summarize_extreme_trades(&result.trades_table, top_k);

    // Stage 6: report
    let report = Report {
        ranked_pairs: ranked,
        trades: result.trades_table.clone(),
        equity: EquityRow::from_result(&result),
        extremes,
        grid: Vec::new(),
    };
    write_report(&report, output_dir(output, &config).as_deref())
}

fn run_grid_search(
    config_path: &Path,
    output: Option<&Path>,
    top: usize,
) -> Result<(), PairtraderError> {
    // Stage 1: config
    let config = load_config(config_path)?;
    let data = build_data_settings(&config)?;
    let spec = build_grid_spec(&config)?;

    // Stage 2: prices
    let source = open_source(&data)?;
    let prepared = prepare_prices(&source, &data)?;

    // Stage 3: pair selection and sweep over the trading window
    let (stock1, stock2, ranked) = choose_pair(&config, &prepared.train)?;
    let base = build_backtest(&config, &stock1, &stock2)?;
    eprintln!(
        "Grid search: {} / {}, objective={}, {} x {} x {} x {} grid",
        stock1,
        stock2,
        spec.objective,
        spec.entry_z.len(),
        spec.exit_z.len(),
        spec.stop_loss.len(),
        spec.take_profit.len()
    );
    let results = grid_search(&prepared.test, &base, &spec)?;
    eprintln!("  Evaluated: {} combinations", results.len());
    eprintln!("\n=== Best Parameters ===");
    eprint!("{}", format_grid(&results, top));

    let report = Report {
        ranked_pairs: ranked,
        grid: results,
        ..Report::default()
    };
    write_report(&report, output_dir(output, &config).as_deref())
}

fn run_validate(config_path: &Path) -> Result<(), PairtraderError> {
    let config = load_config(config_path)?;
    let data = build_data_settings(&config)?;
    let ranker = build_ranker(&config)?;
    let rules = build_exit_rules(&config)?;
    let spec = build_grid_spec(&config)?;

    let pair = match (
        config.get_trimmed("strategy", "stock1"),
        config.get_trimmed("strategy", "stock2"),
    ) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => None,
    };
    let (s1, s2) = pair.clone().unwrap_or_else(|| ("A".to_string(), "B".to_string()));
    let engine = build_backtest(&config, &s1, &s2)?;
    engine.validate(&rules)?;

    eprintln!("\nUniverse:");
    eprintln!("  source:  {}", data.source.display());
    eprintln!("  tickers: {}", data.tickers.join(", "));
    eprintln!("  range:   {} to {}", data.start, data.end);
    if let Some(test_start) = data.test_start {
        eprintln!("  test:    from {test_start}");
    }
    eprintln!("\nRanking:");
    eprintln!("  use_logs={}, beta_window={}", ranker.use_logs(), ranker.beta_window());
    eprintln!("\nStrategy:");
    match &pair {
        Some((a, b)) => eprintln!("  pair:    {a} / {b}"),
        None => eprintln!(
            "  pair:    rank #{} of the training window",
            config.get_int("ranking", "pair_rank", 0)
        ),
    }
    eprintln!(
        "  entry_z={}, exit_z={}, cost/leg={}",
        engine.entry_z, engine.exit_z, engine.tx_cost_per_leg
    );
    eprintln!("\nGrid:");
    eprintln!(
        "  {} entry x {} exit x {} sl x {} tp, objective={}",
        spec.entry_z.len(),
        spec.exit_z.len(),
        spec.stop_loss.len(),
        spec.take_profit.len(),
        spec.objective
    );
    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn run_list_tickers(source: Option<&Path>, config: Option<&Path>) -> Result<(), PairtraderError> {
    let path = match (source, config) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(c)) => {
            let config = load_config(c)?;
            config
                .get_trimmed("data", "source")
                .map(PathBuf::from)
                .ok_or_else(|| PairtraderError::ConfigMissing {
                    section: "data".into(),
                    key: "source".into(),
                })?
        }
        (None, None) => {
            return Err(PairtraderError::invalid(
                "source",
                "--source or --config is required for list-tickers",
            ));
        }
    };

    let tickers = CsvPriceSource::open(&path)?.list_tickers()?;
    if tickers.is_empty() {
        eprintln!("No tickers found in {}", path.display());
    } else {
        for ticker in &tickers {
            println!("{ticker}");
        }
        eprintln!("{} tickers found", tickers.len());
    }
    Ok(())
}
