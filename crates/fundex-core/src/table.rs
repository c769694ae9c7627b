//! Outbound tables with stable column keys.
//!
//! Rows carry typed values keyed by [`Column`]; display labels are looked up
//! per [`Locale`] only when a presentation layer asks for them.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::peer_group::{PeerRow, Positioning};
use crate::signals::Decision;
use crate::valuation::{ValuationResult, ValuationStatus};
use crate::{FinancialSnapshot, ProviderId, Ticker, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl FromStr for Locale {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Self::En),
            "zh" | "zh-cn" | "chinese" => Ok(Self::Zh),
            _ => Err(ValidationError::InvalidLocale {
                value: value.to_owned(),
            }),
        }
    }
}

/// Stable internal column keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Ticker,
    Name,
    Source,
    Price,
    MarketCap,
    RoePct,
    GrossMarginPct,
    NetMarginPct,
    DividendYieldPct,
    FcfYieldPct,
    IntrinsicValue,
    FairPrice,
    UpsidePct,
    PaybackYears,
    Score,
    Status,
    RevenueCagrPct,
    Positioning,
}

impl Column {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Name => "name",
            Self::Source => "source",
            Self::Price => "price",
            Self::MarketCap => "market_cap",
            Self::RoePct => "roe_pct",
            Self::GrossMarginPct => "gross_margin_pct",
            Self::NetMarginPct => "net_margin_pct",
            Self::DividendYieldPct => "dividend_yield_pct",
            Self::FcfYieldPct => "fcf_yield_pct",
            Self::IntrinsicValue => "intrinsic_value",
            Self::FairPrice => "fair_price",
            Self::UpsidePct => "upside_pct",
            Self::PaybackYears => "payback_years",
            Self::Score => "score",
            Self::Status => "status",
            Self::RevenueCagrPct => "revenue_cagr_pct",
            Self::Positioning => "positioning",
        }
    }

    pub const fn label(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Self::Ticker, Locale::En) => "Ticker",
            (Self::Ticker, Locale::Zh) => "代码",
            (Self::Name, Locale::En) => "Name",
            (Self::Name, Locale::Zh) => "名称",
            (Self::Source, Locale::En) => "Source",
            (Self::Source, Locale::Zh) => "数据源",
            (Self::Price, Locale::En) => "Price",
            (Self::Price, Locale::Zh) => "现价",
            (Self::MarketCap, Locale::En) => "Market Cap",
            (Self::MarketCap, Locale::Zh) => "市值",
            (Self::RoePct, _) => "ROE%",
            (Self::GrossMarginPct, Locale::En) => "Gross Margin%",
            (Self::GrossMarginPct, Locale::Zh) => "毛利率%",
            (Self::NetMarginPct, Locale::En) => "Net Margin%",
            (Self::NetMarginPct, Locale::Zh) => "净利率%",
            (Self::DividendYieldPct, Locale::En) => "Dividend Yield%",
            (Self::DividendYieldPct, Locale::Zh) => "股息率%",
            (Self::FcfYieldPct, Locale::En) => "FCF Yield%",
            (Self::FcfYieldPct, Locale::Zh) => "FCF收益率%",
            (Self::IntrinsicValue, Locale::En) => "Intrinsic Value",
            (Self::IntrinsicValue, Locale::Zh) => "内在价值",
            (Self::FairPrice, Locale::En) => "Fair Price",
            (Self::FairPrice, Locale::Zh) => "合理价格",
            (Self::UpsidePct, Locale::En) => "Upside%",
            (Self::UpsidePct, Locale::Zh) => "上涨空间%",
            (Self::PaybackYears, Locale::En) => "Payback (yrs)",
            (Self::PaybackYears, Locale::Zh) => "回本年限",
            (Self::Score, Locale::En) => "Score",
            (Self::Score, Locale::Zh) => "综合评分",
            (Self::Status, Locale::En) => "Valuation",
            (Self::Status, Locale::Zh) => "估值",
            (Self::RevenueCagrPct, Locale::En) => "Revenue CAGR%",
            (Self::RevenueCagrPct, Locale::Zh) => "营收复合增速%",
            (Self::Positioning, Locale::En) => "Positioning",
            (Self::Positioning, Locale::Zh) => "定位",
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

pub const fn status_label(status: ValuationStatus, locale: Locale) -> &'static str {
    match (status, locale) {
        (ValuationStatus::Undervalued, Locale::En) => "undervalued",
        (ValuationStatus::Undervalued, Locale::Zh) => "低估",
        (ValuationStatus::Fair, Locale::En) => "fair",
        (ValuationStatus::Fair, Locale::Zh) => "合理",
        (ValuationStatus::Overvalued, Locale::En) => "overvalued",
        (ValuationStatus::Overvalued, Locale::Zh) => "高估",
    }
}

pub const fn decision_label(decision: Decision, locale: Locale) -> &'static str {
    match (decision, locale) {
        (Decision::Opportunity, Locale::En) => "opportunity: base breakout",
        (Decision::Opportunity, Locale::Zh) => "机会: 底部启动",
        (Decision::Risk, Locale::En) => "risk: topping out",
        (Decision::Risk, Locale::Zh) => "风险: 高位见顶",
        (Decision::Momentum, Locale::En) => "momentum: strong uptrend",
        (Decision::Momentum, Locale::Zh) => "趋势: 强势上涨",
        (Decision::Watch, Locale::En) => "watch",
        (Decision::Watch, Locale::Zh) => "观望",
    }
}

pub const fn positioning_label(positioning: Positioning, locale: Locale) -> &'static str {
    match (positioning, locale) {
        (Positioning::Leader, Locale::En) => "leader",
        (Positioning::Leader, Locale::Zh) => "龙头",
        (Positioning::Grower, Locale::En) => "grower",
        (Positioning::Grower, Locale::Zh) => "成长",
        (Positioning::Harvester, Locale::En) => "harvester",
        (Positioning::Harvester, Locale::Zh) => "收割",
        (Positioning::Laggard, Locale::En) => "laggard",
        (Positioning::Laggard, Locale::Zh) => "落后",
    }
}

/// One table cell. Missing values serialize as `null`, never as zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Missing,
}

impl Cell {
    fn percent(fraction: Option<f64>) -> Self {
        fraction.map_or(Self::Missing, |value| Self::Number(value * 100.0))
    }

    fn number(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Number)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Number(value) if value.is_finite() => serializer.serialize_f64(*value),
            Self::Number(_) | Self::Missing => serializer.serialize_none(),
        }
    }
}

/// Rows that can be rendered into a [`LocalizedTable`].
pub trait TableRow {
    fn cell(&self, column: Column, locale: Locale) -> Cell;
}

/// Display-ready table: localized headers plus cells, in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedTable {
    pub columns: Vec<Column>,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl LocalizedTable {
    pub fn build<R: TableRow>(columns: &[Column], rows: &[R], locale: Locale) -> Self {
        Self {
            columns: columns.to_vec(),
            headers: columns.iter().map(|column| column.label(locale)).collect(),
            rows: rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|column| row.cell(*column, locale))
                        .collect()
                })
                .collect(),
        }
    }
}

/// One valued symbol of a screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenRow {
    pub ticker: Ticker,
    pub name: String,
    pub source: ProviderId,
    pub price: f64,
    pub market_cap: f64,
    pub return_on_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub valuation: ValuationResult,
}

impl ScreenRow {
    pub fn new(snapshot: &FinancialSnapshot, valuation: ValuationResult) -> Self {
        Self {
            ticker: snapshot.ticker.clone(),
            name: snapshot.name.clone(),
            source: snapshot.source,
            price: snapshot.price,
            market_cap: snapshot.market_cap,
            return_on_equity: snapshot.return_on_equity,
            gross_margin: snapshot.gross_margin,
            net_margin: snapshot.net_margin,
            dividend_yield: snapshot.dividend_yield,
            valuation,
        }
    }
}

impl TableRow for ScreenRow {
    fn cell(&self, column: Column, locale: Locale) -> Cell {
        match column {
            Column::Ticker => Cell::Text(self.ticker.to_string()),
            Column::Name => Cell::Text(self.name.clone()),
            Column::Source => Cell::Text(self.source.to_string()),
            Column::Price => Cell::Number(self.price),
            Column::MarketCap => Cell::Number(self.market_cap),
            Column::RoePct => Cell::percent(self.return_on_equity),
            Column::GrossMarginPct => Cell::percent(self.gross_margin),
            Column::NetMarginPct => Cell::percent(self.net_margin),
            Column::DividendYieldPct => Cell::percent(self.dividend_yield),
            Column::FcfYieldPct => Cell::percent(Some(self.valuation.fcf_yield)),
            Column::IntrinsicValue => Cell::Number(self.valuation.intrinsic_value),
            Column::FairPrice => Cell::number(self.valuation.fair_price),
            Column::UpsidePct => Cell::percent(Some(self.valuation.upside)),
            Column::PaybackYears => Cell::number(self.valuation.payback_years),
            Column::Score => Cell::Number(self.valuation.score),
            Column::Status => self
                .valuation
                .status
                .map_or(Cell::Missing, |status| {
                    Cell::Text(status_label(status, locale).to_owned())
                }),
            Column::RevenueCagrPct | Column::Positioning => Cell::Missing,
        }
    }
}

impl TableRow for PeerRow {
    fn cell(&self, column: Column, locale: Locale) -> Cell {
        match column {
            Column::Ticker => Cell::Text(self.ticker.to_string()),
            Column::Name => Cell::Text(self.name.clone()),
            Column::RevenueCagrPct => Cell::percent(self.revenue_cagr),
            Column::NetMarginPct => Cell::percent(self.net_margin),
            Column::RoePct => Cell::percent(self.return_on_equity),
            Column::FcfYieldPct => Cell::percent(self.fcf_yield),
            Column::Positioning => {
                Cell::Text(positioning_label(self.positioning, locale).to_owned())
            }
            _ => Cell::Missing,
        }
    }
}

/// A symbol that resolved but could not be valued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSymbol {
    pub ticker: Ticker,
    pub reason: String,
}

/// Result of a screen: valued rows sorted by score, plus the symbols that
/// were skipped (valuation failed) or omitted (no data).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenTable {
    pub rows: Vec<ScreenRow>,
    pub skipped: Vec<SkippedSymbol>,
    pub omitted: Vec<Ticker>,
    /// Rows removed by the minimum thresholds.
    pub filtered_out: usize,
}

impl ScreenTable {
    pub const COLUMNS: [Column; 11] = [
        Column::Ticker,
        Column::Name,
        Column::Price,
        Column::RoePct,
        Column::NetMarginPct,
        Column::FcfYieldPct,
        Column::DividendYieldPct,
        Column::FairPrice,
        Column::UpsidePct,
        Column::Score,
        Column::Status,
    ];

    pub fn localized(&self, locale: Locale) -> LocalizedTable {
        LocalizedTable::build(&Self::COLUMNS, &self.rows, locale)
    }
}

/// Columns of a peer comparison table.
pub const PEER_COLUMNS: [Column; 7] = [
    Column::Ticker,
    Column::Name,
    Column::RevenueCagrPct,
    Column::NetMarginPct,
    Column::RoePct,
    Column::FcfYieldPct,
    Column::Positioning,
];
