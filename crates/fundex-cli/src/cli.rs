//! CLI argument definitions for Fundex.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `normalize` | Canonical ticker and market class for free-form input |
//! | `snapshot` | Resolve one symbol through the provider cascade |
//! | `value` | Deep dive: valuation, trend signal and price grid |
//! | `screen` | Value and rank several symbols |
//! | `peers` | Peer group comparison |
//! | `groups` | List peer groups |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--mock` | `false` | Seeded adapters, no network |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--lang` | `en` | Table header language (en, zh) |
//! | `--max-concurrency` | env or `10` | Batch fetch bound |
//! | `--timeout-ms` | env or `10000` | Per-call provider timeout |
//! | `--log-json` | `false` | JSON log lines on stderr |
//! | `--refresh-cache` | `false` | Skip cached reads, store fresh results |
//!
//! # Examples
//!
//! ```bash
//! fundex normalize 贵州茅台
//! fundex --mock value 0700 --segment technology --pretty
//! fundex --lang zh screen AAPL MSFT 600519 --min-roe 0.15
//! fundex peers us-dividend --refresh
//! ```

use clap::{Args, Parser, Subcommand};
use fundex_core::{Locale, MarketSegment, ProviderId};

/// Fundex - multi-source fundamentals and valuation CLI
#[derive(Debug, Parser)]
#[command(
    name = "fundex",
    author,
    version,
    about = "Multi-source fundamentals resolution and valuation",
    long_about = "Fundex resolves free-form symbols (names, exchange codes or tickers) through \
an ordered list of fundamentals providers and values them with a two-stage DCF.\n\
\n\
Use 'fundex <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Use seeded mock adapters instead of live providers.
    #[arg(long, global = true, default_value_t = false)]
    pub mock: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Language of table headers and labels (en, zh).
    #[arg(long, global = true, default_value = "en")]
    pub lang: Locale,

    /// Maximum number of symbols fetched concurrently.
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Per-call provider timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Emit log lines as JSON (stderr).
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    /// Ignore cached snapshots and screens; fresh results replace them.
    #[arg(long, global = true, default_value_t = false)]
    pub refresh_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the canonical ticker and market class for an input.
    ///
    /// # Examples
    ///
    ///   fundex normalize 腾讯控股
    ///   fundex normalize 600519
    Normalize(NormalizeArgs),

    /// Resolve one symbol and print its snapshot with the provider chain.
    ///
    /// # Examples
    ///
    ///   fundex snapshot AAPL
    ///   fundex snapshot 600519 --provider eastmoney --provider yahoo
    Snapshot(SnapshotArgs),

    /// Deep dive: DCF valuation, status, trend score and decision.
    ///
    /// # Examples
    ///
    ///   fundex value 0700 --segment technology
    ///   fundex value AAPL --discount 0.09 --growth 0.06 --strict-fcf
    Value(ValueArgs),

    /// Value and rank several symbols by composite score.
    ///
    /// # Examples
    ///
    ///   fundex screen AAPL MSFT KO
    ///   fundex --lang zh screen 600519 000858 --min-fcf-yield 0.03
    Screen(ScreenArgs),

    /// Peer group comparison.
    ///
    /// # Examples
    ///
    ///   fundex peers hk-internet --refresh
    Peers(PeersArgs),

    /// List the built-in peer groups.
    Groups,
}

/// Arguments for the `normalize` command.
#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Company name, short name, exchange code or ticker.
    pub input: String,
}

/// Arguments for the `snapshot` command.
#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Company name, short name, exchange code or ticker.
    pub input: String,

    /// Explicit provider order (repeatable). Defaults to the market order.
    #[arg(long = "provider")]
    pub providers: Vec<ProviderId>,
}

/// Arguments for the `value` command.
#[derive(Debug, Args)]
pub struct ValueArgs {
    /// Company name, short name, exchange code or ticker.
    pub input: String,

    #[command(flatten)]
    pub valuation: ValuationArgs,
}

/// Valuation knobs shared by `value` and `screen`.
#[derive(Debug, Args)]
pub struct ValuationArgs {
    /// Discount rate as a fraction (e.g. 0.10).
    #[arg(long)]
    pub discount: Option<f64>,

    /// Stage-one growth rate override as a fraction.
    #[arg(long)]
    pub growth: Option<f64>,

    /// Market segment for the default growth rate.
    ///
    /// technology, value_dividend, foreign_core or general.
    #[arg(long)]
    pub segment: Option<MarketSegment>,

    /// Reject non-positive free cash flow instead of valuing it at zero.
    #[arg(long, default_value_t = false)]
    pub strict_fcf: bool,
}

/// Arguments for the `screen` command.
#[derive(Debug, Args)]
pub struct ScreenArgs {
    /// Symbols to screen.
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Minimum return on equity, as a fraction.
    #[arg(long)]
    pub min_roe: Option<f64>,

    /// Minimum free-cash-flow yield, as a fraction.
    #[arg(long)]
    pub min_fcf_yield: Option<f64>,

    /// Minimum DCF upside, as a fraction.
    #[arg(long)]
    pub min_upside: Option<f64>,

    #[command(flatten)]
    pub valuation: ValuationArgs,
}

/// Arguments for the `peers` command.
#[derive(Debug, Args)]
pub struct PeersArgs {
    /// Peer group name (see `fundex groups`).
    pub group: String,

    /// Fetch every member and rebuild the comparison.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}
