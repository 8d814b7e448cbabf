//! CLI definition and dispatch.
//!
//! Every subcommand reads an optional INI file, lets flags override it,
//! and prints its result to stdout. Progress and warnings go to stderr
//! through `tracing`.

use chrono::{Duration, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::{BacktestReport, WalkForwardBacktestEngine, WalkForwardConfig};
use crate::domain::config::{
    UniverseSettings, combine_config, optimizer_config, rebalance_config, retry_policy,
    store_settings, universe_settings, validate_walkforward_config, walkforward_config,
};
use crate::domain::error::QuantError;
use crate::domain::factor::analyzer::{AnalysisConfig, FactorAnalysisResult};
use crate::domain::factor::combiner::IcStat;
use crate::domain::factor::{CombineMethod, FactorAnalyzer, FactorCategory, FactorCombiner, FactorContext, FactorRegistry};
use crate::domain::market::Market;
use crate::domain::portal::{HistoricalDataPortal, SeriesSource};
use crate::domain::portfolio::attribution::{self, AttributionInput};
use crate::domain::portfolio::optimizer::OptimizeInput;
use crate::domain::portfolio::rebalancer::RebalanceInput;
use crate::domain::portfolio::{OptimizeMethod, PortfolioOptimizer, PortfolioRebalancer, Weights};
use crate::domain::retry::RetryPolicy;
use crate::domain::strategy;
use crate::domain::universe::UniverseProvider;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::fundamentals_port::{AltDataPort, FundamentalsPort};
use crate::ports::report_port::ReportPort;
use crate::ports::universe_port::UniversePort;

#[derive(Parser, Debug)]
#[command(name = "quantlab", about = "Walk-forward backtesting and factor research")]
pub struct Cli {
    /// INI configuration file; every key is optional
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward backtest
    Backtest(BacktestArgs),
    /// Measure factor IC over a resolved universe
    Analyze(AnalyzeArgs),
    /// List registered factors
    Factors {
        #[arg(long, value_enum)]
        category: Option<FactorCategory>,
        #[arg(long, value_enum)]
        market: Option<Market>,
    },
    /// Allocate weights from expected returns and covariance (JSON in, JSON out)
    Optimize {
        /// JSON input file, or `-` for stdin
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        method: Option<OptimizeMethod>,
    },
    /// Check drift and emit rebalancing orders (JSON in, JSON out)
    Rebalance {
        #[arg(short, long)]
        input: PathBuf,
        /// Evaluation date; defaults to the input's `as_of`, then today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Brinson and factor attribution (JSON in, JSON out)
    Attribution {
        #[arg(short, long)]
        input: PathBuf,
        /// `YYYY-MM` label; defaults to the input's month, then the current month
        #[arg(long)]
        month: Option<String>,
    },
}

/// Walk-forward window overrides. Values are clamped to the engine's minimums.
#[derive(Args, Debug, Default, Clone)]
pub struct WindowArgs {
    #[arg(long)]
    pub train_window: Option<usize>,
    #[arg(long)]
    pub test_window: Option<usize>,
    #[arg(long)]
    pub step: Option<usize>,
    #[arg(long)]
    pub hold_days: Option<usize>,
    #[arg(long)]
    pub top_n: Option<usize>,
    #[arg(long)]
    pub max_universe: Option<usize>,
}

impl WindowArgs {
    pub fn apply(&self, cfg: &mut WalkForwardConfig) {
        cfg.train_window = self.train_window.unwrap_or(cfg.train_window).max(21);
        cfg.test_window = self.test_window.unwrap_or(cfg.test_window).max(5);
        cfg.step = self.step.unwrap_or(cfg.step).max(1);
        cfg.hold_days = self.hold_days.unwrap_or(cfg.hold_days).max(1);
        cfg.top_n = self.top_n.unwrap_or(cfg.top_n).max(1);
        cfg.max_universe = self.max_universe.unwrap_or(cfg.max_universe).max(1);
    }
}

#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Strategy key
    #[arg(short, long, default_value = "momentum")]
    pub strategy: String,
    /// Evaluation horizon in years, used when --start is absent
    #[arg(long, default_value_t = 3)]
    pub years: u32,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
    #[arg(short, long, value_enum)]
    pub market: Option<Market>,
    #[command(flatten)]
    pub windows: WindowArgs,
    /// Also write the full report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print the JSON report instead of the summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(short, long, value_enum)]
    pub market: Option<Market>,
    /// Comma-separated factor names; defaults to every factor admitted for the market
    #[arg(long, value_delimiter = ',')]
    pub factors: Vec<String>,
    #[arg(long, value_enum)]
    pub category: Option<FactorCategory>,
    #[arg(long, default_value_t = 3)]
    pub years: u32,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
    /// Forward-return horizon in bars
    #[arg(long, default_value_t = 21)]
    pub horizon: usize,
    #[arg(long, default_value_t = 5)]
    pub quantiles: usize,
    #[arg(long, default_value_t = 10)]
    pub min_cross_section: usize,
    #[arg(long)]
    pub max_symbols: Option<usize>,
    /// Overrides `[combiner] method`
    #[arg(long, value_enum)]
    pub combine: Option<CombineMethod>,
}

pub fn run(cli: Cli) -> ExitCode {
    let config = cli.config.as_deref();
    let result = match cli.command {
        Command::Backtest(args) => run_backtest(config, &args),
        Command::Analyze(args) => run_analyze(config, &args),
        Command::Factors { category, market } => run_factors(category, market),
        Command::Optimize { input, method } => run_optimize(config, &input, method),
        Command::Rebalance { input, as_of } => run_rebalance(config, &input, as_of),
        Command::Attribution { input, month } => run_attribution(&input, month),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Parse the INI file at `path`, or an empty configuration when none is given.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, QuantError> {
    match path {
        Some(p) => {
            tracing::info!(path = %p.display(), "loading config");
            FileConfigAdapter::from_file(p)
        }
        None => FileConfigAdapter::from_string(""),
    }
}

/// Deserialize a JSON document from a file, or from stdin when `path` is `-`.
pub fn read_input<T: DeserializeOwned>(path: &Path) -> Result<T, QuantError> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<ExitCode, QuantError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(ExitCode::SUCCESS)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `[start, end]` for a run: `end` defaults to today and `start` to
/// `years` years (at least one) plus `warmup` days before it.
pub fn evaluation_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    years: u32,
    warmup: usize,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or(today);
    let start = start
        .unwrap_or_else(|| end - Duration::days(i64::from(years.max(1)) * 365 + warmup as i64));
    (start, end)
}

/// Collaborators behind the data-backed subcommands. The SQLite store is
/// primary for every concern; the CSV directory is the secondary quote
/// source and, with `[universe] us_membership_csv`, the US membership file.
/// Without SQLite the CSV directory also backs the KR universe tables.
#[derive(Default, Clone)]
pub struct Stores {
    pub data: Option<Rc<dyn DataPort>>,
    pub fallback: Option<Rc<dyn DataPort>>,
    pub universe: Option<Rc<dyn UniversePort>>,
    pub membership: Option<Rc<dyn UniversePort>>,
    pub fundamentals: Option<Rc<dyn FundamentalsPort>>,
    pub alt: Option<Rc<dyn AltDataPort>>,
}

impl Stores {
    pub fn open(config: &dyn ConfigPort) -> Result<Self, QuantError> {
        let settings = store_settings(config)?;
        let universe = universe_settings(config)?;
        let mut stores = Stores::default();

        #[cfg(feature = "sqlite")]
        if settings.sqlite_path.is_some() {
            use crate::adapters::sqlite_adapter::SqliteAdapter;

            let sqlite = Rc::new(SqliteAdapter::from_config(config)?);
            sqlite.initialize_schema()?;
            stores.data = Some(Rc::clone(&sqlite) as Rc<dyn DataPort>);
            stores.universe = Some(Rc::clone(&sqlite) as Rc<dyn UniversePort>);
            stores.fundamentals = Some(Rc::clone(&sqlite) as Rc<dyn FundamentalsPort>);
            stores.alt = Some(sqlite as Rc<dyn AltDataPort>);
        }
        #[cfg(not(feature = "sqlite"))]
        if settings.sqlite_path.is_some() {
            tracing::warn!("sqlite support not compiled in, [sqlite] path ignored");
        }

        let csv = match (settings.csv_path, universe.us_membership_csv) {
            (Some(base), membership) => {
                let csv = CsvAdapter::new(base);
                let csv = match membership {
                    Some(m) => csv.with_us_membership(m),
                    None => csv,
                };
                let csv = Rc::new(csv);
                stores.fallback = Some(Rc::clone(&csv) as Rc<dyn DataPort>);
                if stores.universe.is_none() {
                    stores.universe = Some(Rc::clone(&csv) as Rc<dyn UniversePort>);
                }
                Some(csv)
            }
            (None, Some(m)) => Some(Rc::new(CsvAdapter::new(PathBuf::new()).with_us_membership(m))),
            (None, None) => None,
        };
        if let Some(csv) = csv {
            stores.membership = Some(csv as Rc<dyn UniversePort>);
        }

        if stores.data.is_none() && stores.fallback.is_none() {
            tracing::warn!("no [sqlite] or [csv] store configured, series will be empty");
        }
        Ok(stores)
    }

    pub fn series_source(&self, retry: RetryPolicy) -> SeriesSource {
        SeriesSource::new(self.data.clone(), self.fallback.clone(), retry)
    }

    pub fn universe_provider(&self, settings: &UniverseSettings, retry: RetryPolicy) -> UniverseProvider {
        let mut provider =
            UniverseProvider::new(self.universe.clone(), self.membership.clone()).with_retry(retry);
        if let Some(codes) = &settings.kr_fallback {
            provider = provider.with_kr_fallback(codes.clone());
        }
        if let Some(codes) = &settings.us_fallback {
            provider = provider.with_us_fallback(codes.clone());
        }
        provider
    }

    pub fn factor_context(&self, retry: RetryPolicy) -> FactorContext {
        let mut ctx = FactorContext::new(self.series_source(retry.clone())).with_retry(retry);
        if let Some(port) = &self.fundamentals {
            ctx = ctx.with_fundamentals(Rc::clone(port));
        }
        if let Some(port) = &self.alt {
            ctx = ctx.with_alt_data(Rc::clone(port));
        }
        ctx
    }
}

/// Typed walk-forward config: INI values, then flag overrides and clamps.
pub fn build_walkforward_config(
    config: &dyn ConfigPort,
    market: Option<Market>,
    windows: &WindowArgs,
) -> Result<WalkForwardConfig, QuantError> {
    let mut cfg = walkforward_config(config)?;
    if let Some(m) = market {
        cfg.market = m;
    }
    windows.apply(&mut cfg);
    validate_walkforward_config(&cfg)?;
    Ok(cfg)
}

fn run_backtest(config_path: Option<&Path>, args: &BacktestArgs) -> Result<ExitCode, QuantError> {
    // Stage 1: Resolve strategy before touching any store
    let strategy = strategy::lookup(&args.strategy)?;

    // Stage 2: Load config and apply overrides
    let config = load_config(config_path)?;
    let wf = build_walkforward_config(&config, args.market, &args.windows)?;
    let retry = retry_policy(&config)?;
    let universe = universe_settings(&config)?;

    // Stage 3: Date range, padded so the first fold has a full train window
    let (start, end) = evaluation_range(
        args.start,
        args.end,
        args.years,
        wf.train_window + wf.test_window,
        today(),
    );

    // Stage 4: Wire stores and run
    let stores = Stores::open(&config)?;
    let market = wf.market;
    let engine = WalkForwardBacktestEngine::new(
        wf,
        stores.universe_provider(&universe, retry.clone()),
        HistoricalDataPortal::new(market, stores.series_source(retry)),
    );
    tracing::info!(strategy = strategy.name(), %market, %start, %end, "running walk-forward backtest");
    let report = engine.run(strategy.as_ref(), start, end);

    // Stage 5: Output
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_summary(&report));
    }
    if let Some(path) = &args.output {
        JsonReportAdapter.write(&report, path)?;
    }

    Ok(if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Console summary of a backtest report.
pub fn format_summary(report: &BacktestReport) -> String {
    let m = &report.metrics;
    let mut lines = vec![
        "=== Walk-Forward Backtest ===".to_string(),
        format!("Strategy:         {} ({})", report.strategy, report.market),
        format!("Period:           {} to {}", report.start_date, report.end_date),
        format!(
            "Windows:          train={} test={} step={} hold={} top_n={}",
            report.train_window, report.test_window, report.step, report.hold_days, report.top_n
        ),
        format!("Folds:            {}", report.folds),
        format!("Trades:           {}", report.trades.len()),
    ];
    if let Some(err) = &report.error {
        lines.push(format!("Status:           halted ({err})"));
    } else {
        lines.extend([
            "\n=== Performance ===".to_string(),
            format!("Total Return:     {:.2}%", m.total_return * 100.0),
            format!("Annualized:       {:.2}%", m.annualized_return * 100.0),
            format!("Sharpe Ratio:     {:.2}", m.sharpe_ratio),
            format!("Sortino Ratio:    {:.2}", m.sortino_ratio),
            format!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0),
            format!("Calmar Ratio:     {:.2}", m.calmar_ratio),
            format!("Win Rate:         {:.1}%", m.win_rate * 100.0),
            format!("Avg Hold Days:    {:.1}", m.avg_hold_days),
        ]);
    }
    lines.join("\n") + "\n"
}

/// Result document of `analyze`.
#[derive(Debug, Serialize)]
pub struct AnalysisOutput {
    pub market: Market,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub universe_size: usize,
    pub results: Vec<FactorAnalysisResult>,
    pub combine_method: CombineMethod,
    pub weights: Weights,
}

/// Factor names to analyze: explicit names must be registered; otherwise
/// every factor admitted for `market`, optionally within `category`.
pub fn select_factors(
    registry: &FactorRegistry,
    explicit: &[String],
    category: Option<FactorCategory>,
    market: Market,
) -> Result<Vec<String>, QuantError> {
    let explicit: Vec<String> = explicit
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if explicit.is_empty() {
        return Ok(registry.available(category, Some(market)));
    }
    for name in &explicit {
        if registry.get(name).is_none() {
            return Err(QuantError::UnknownFactor(name.clone()));
        }
    }
    Ok(explicit)
}

fn run_analyze(config_path: Option<&Path>, args: &AnalyzeArgs) -> Result<ExitCode, QuantError> {
    let config = load_config(config_path)?;
    let wf = build_walkforward_config(&config, args.market, &WindowArgs::default())?;
    let retry = retry_policy(&config)?;
    let universe = universe_settings(&config)?;
    let mut combine = combine_config(&config)?;
    if let Some(method) = args.combine {
        combine.method = method;
    }

    let market = wf.market;
    let (start, end) = evaluation_range(args.start, args.end, args.years, 0, today());
    if start > end {
        return Err(QuantError::invalid(format!("start {start} is after end {end}")));
    }

    let registry = FactorRegistry::with_baseline();
    let names = select_factors(&registry, &args.factors, args.category, market)?;

    let stores = Stores::open(&config)?;
    let max_symbols = args.max_symbols.or(universe.max_symbols).unwrap_or(wf.max_universe);
    let symbols = stores
        .universe_provider(&universe, retry.clone())
        .get_universe_range(start, end, market, 30, max_symbols);
    tracing::info!(%market, symbols = symbols.len(), factors = names.len(), %start, %end, "analyzing factors");

    let ctx = stores.factor_context(retry);
    let analyzer = FactorAnalyzer::new(&registry, &ctx).with_config(AnalysisConfig {
        horizon_days: args.horizon.max(1),
        min_cross_section: args.min_cross_section,
        quantiles: args.quantiles.max(2),
    });
    let results = analyzer.analyze_many(Some(&names), &symbols, start, end, market);

    let fitted: Vec<String> = results.iter().map(|r| r.factor_name.clone()).collect();
    let ic_stats: BTreeMap<String, IcStat> = results
        .iter()
        .map(|r| (r.factor_name.clone(), IcStat::from(r)))
        .collect();
    let (matrix, targets) = match combine.method {
        CombineMethod::IcWeighted => (Vec::new(), Vec::new()),
        CombineMethod::Ridge | CombineMethod::Lasso => {
            analyzer.panel(&fitted, &symbols, start, end, market)?
        }
    };
    let combine_method = combine.method;
    let weights = FactorCombiner::new(combine).fit(&matrix, &targets, Some(&fitted), &ic_stats);

    print_json(&AnalysisOutput {
        market,
        start_date: start,
        end_date: end,
        universe_size: symbols.len(),
        results,
        combine_method,
        weights,
    })
}

fn run_factors(category: Option<FactorCategory>, market: Option<Market>) -> Result<ExitCode, QuantError> {
    let registry = FactorRegistry::with_baseline();
    let names = registry.available(category, market);
    println!("{:<22}{:<13}SCOPE", "NAME", "CATEGORY");
    for def in names.iter().filter_map(|n| registry.get(n)) {
        println!("{:<22}{:<13}{}", def.name, def.category.as_str(), def.scope);
    }
    eprintln!("{} factor(s)", names.len());
    Ok(ExitCode::SUCCESS)
}

fn run_optimize(
    config_path: Option<&Path>,
    input: &Path,
    method: Option<OptimizeMethod>,
) -> Result<ExitCode, QuantError> {
    let config = load_config(config_path)?;
    let optimizer = PortfolioOptimizer::new(optimizer_config(&config)?);
    let input: OptimizeInput = read_input(input)?;
    print_json(&optimizer.optimize(&input, method.unwrap_or_default()))
}

fn run_rebalance(
    config_path: Option<&Path>,
    input: &Path,
    as_of: Option<NaiveDate>,
) -> Result<ExitCode, QuantError> {
    let config = load_config(config_path)?;
    let rebalancer = PortfolioRebalancer::new(rebalance_config(&config)?);
    let input: RebalanceInput = read_input(input)?;
    let as_of = as_of.or(input.as_of).unwrap_or_else(today);
    print_json(&rebalancer.plan(&input, as_of))
}

fn run_attribution(input: &Path, month: Option<String>) -> Result<ExitCode, QuantError> {
    let mut input: AttributionInput = read_input(input)?;
    if month.is_some() {
        input.month = month;
    }
    let current = today().format("%Y-%m").to_string();
    print_json(&attribution::report(&input, &current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::PerformanceMetrics;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn window_flags_are_clamped() {
        let mut cfg = WalkForwardConfig::default();
        let windows = WindowArgs {
            train_window: Some(5),
            test_window: Some(1),
            step: Some(0),
            hold_days: Some(0),
            top_n: Some(0),
            max_universe: None,
        };
        windows.apply(&mut cfg);
        assert_eq!(cfg.train_window, 21);
        assert_eq!(cfg.test_window, 5);
        assert_eq!(cfg.step, 1);
        assert_eq!(cfg.hold_days, 1);
        assert_eq!(cfg.top_n, 1);
        assert_eq!(cfg.max_universe, 200);
    }

    #[test]
    fn flags_override_config() {
        let config =
            FileConfigAdapter::from_string("[walkforward]\ntrain_window = 120\nmarket = us\n").unwrap();
        let windows = WindowArgs {
            test_window: Some(40),
            ..WindowArgs::default()
        };
        let cfg = build_walkforward_config(&config, Some(Market::Btc), &windows).unwrap();
        assert_eq!(cfg.train_window, 120);
        assert_eq!(cfg.test_window, 40);
        assert_eq!(cfg.market, Market::Btc);
    }

    #[test]
    fn default_range_pads_warmup() {
        let (start, end) = evaluation_range(None, None, 3, 315, d(2024, 6, 30));
        assert_eq!(end, d(2024, 6, 30));
        assert_eq!((end - start).num_days(), 3 * 365 + 315);

        let (start, _) = evaluation_range(None, Some(d(2024, 1, 1)), 0, 0, d(2030, 1, 1));
        assert_eq!(start, d(2023, 1, 1));

        let explicit = evaluation_range(Some(d(2020, 1, 1)), Some(d(2021, 1, 1)), 3, 315, d(2030, 1, 1));
        assert_eq!(explicit, (d(2020, 1, 1), d(2021, 1, 1)));
    }

    #[test]
    fn explicit_factors_must_exist() {
        let registry = FactorRegistry::with_baseline();
        let names = select_factors(&registry, &[" RSI_14D ".into()], None, Market::Us).unwrap();
        assert_eq!(names, vec!["rsi_14d".to_string()]);

        let err = select_factors(&registry, &["nope".into()], None, Market::Us).unwrap_err();
        assert!(matches!(err, QuantError::UnknownFactor(n) if n == "nope"));

        let value = select_factors(&registry, &[], Some(FactorCategory::Value), Market::Btc).unwrap();
        assert_eq!(value, vec!["ev_ebitda", "pb_ratio", "pe_ratio"]);
        assert_eq!(select_factors(&registry, &[], None, Market::Kr).unwrap().len(), 20);
    }

    #[test]
    fn empty_config_opens_no_stores() {
        let config = load_config(None).unwrap();
        let stores = Stores::open(&config).unwrap();
        assert!(stores.data.is_none());
        assert!(stores.fallback.is_none());
        assert!(stores.membership.is_none());
    }

    #[test]
    fn csv_store_fills_quote_and_universe_roles() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = format!("[csv]\npath = {}\n", dir.path().display());
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let stores = Stores::open(&config).unwrap();
        assert!(stores.fallback.is_some());
        assert!(stores.universe.is_some());
        assert!(stores.membership.is_some());
    }

    #[test]
    fn csv_only_kr_universe_comes_from_bar_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("123456_kr.csv"),
            "date,open,high,low,close,volume\n2024-01-02,10,11,9,10,1000\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("654321_kr.csv"),
            "date,open,high,low,close,volume\n2024-02-01,10,11,9,10,1000\n",
        )
        .unwrap();
        let ini = format!("[csv]\npath = {}\n", dir.path().display());
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let stores = Stores::open(&config).unwrap();
        let provider = stores.universe_provider(&universe_settings(&config).unwrap(), RetryPolicy::none());

        // 654321 has no bar on or before the cutoff
        assert_eq!(provider.get_universe(d(2024, 1, 3), Market::Kr, 10), vec!["123456".to_string()]);
        assert_eq!(
            provider.get_universe(d(2024, 3, 1), Market::Kr, 10),
            vec!["654321".to_string(), "123456".to_string()]
        );
    }

    fn report(error: Option<crate::domain::backtest::BacktestError>) -> BacktestReport {
        BacktestReport {
            strategy: "momentum".into(),
            market: Market::Kr,
            start_date: d(2021, 1, 1),
            end_date: d(2024, 1, 1),
            calendar_days: 700,
            train_window: 252,
            test_window: 63,
            step: 21,
            hold_days: 5,
            top_n: 10,
            folds: 18,
            fold_windows: Vec::new(),
            metrics: PerformanceMetrics {
                total_return: 0.1234,
                sharpe_ratio: 1.5,
                max_drawdown: 0.08,
                win_rate: 0.55,
                ..PerformanceMetrics::default()
            },
            daily_returns: Vec::new(),
            trades: Vec::new(),
            error,
        }
    }

    #[test]
    fn summary_lists_metrics() {
        let text = format_summary(&report(None));
        assert!(text.contains("Strategy:         momentum (kr)"));
        assert!(text.contains("Total Return:     12.34%"));
        assert!(text.contains("Max Drawdown:     -8.0%"));
        assert!(text.contains("Win Rate:         55.0%"));
        assert!(text.contains("Trades:           0\n\n=== Performance ===\n"));
        assert!(text.ends_with("Avg Hold Days:    0.0\n"));
    }

    #[test]
    fn halted_summary_shows_reason() {
        use crate::domain::backtest::BacktestError;
        let text = format_summary(&report(Some(BacktestError::EmptyUniverse)));
        assert!(text.contains("halted (universe is empty)"));
        assert!(!text.contains("Sharpe"));
    }
}
