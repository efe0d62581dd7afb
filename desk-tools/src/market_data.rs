//! Market data from Yahoo Finance's public endpoints
//!
//! Four functions, matching what the finance persona is allowed to look up:
//! current price, analyst recommendations, company profile and recent news.
//!
//! `quoteSummary` needs a session cookie plus a crumb token. The crumb is
//! fetched on first use and refreshed once if Yahoo rejects it.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;
use tracing::debug;

use desk_core::ToolKind;

use crate::toolbox::{check_status, count_arg, required_str};
use crate::{Tool, ToolDefinition, ToolError};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URL: &str = "https://query1.finance.yahoo.com/v1/test/getcrumb";

static SYMBOL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.\-=^]{1,15}$").unwrap());

/// Stock market data tool
pub struct MarketDataTools {
    client: Client,
    crumb: Mutex<Option<String>>,
}

impl MarketDataTools {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            crumb: Mutex::new(None),
        }
    }

    async fn crumb(&self, refresh: bool) -> Result<String, ToolError> {
        let mut cached = self.crumb.lock().await;
        if refresh {
            *cached = None;
        }
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only sets the session cookie; the page itself is a 404
        self.client.get(COOKIE_URL).send().await?;

        let response = self.client.get(CRUMB_URL).send().await?;
        let crumb = parse_crumb(&check_status(response).await?.text().await?)?;
        debug!("Obtained Yahoo crumb");

        *cached = Some(crumb.clone());
        Ok(crumb)
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ToolError> {
        debug!("Market data request: {}", url);
        let response = self.client.get(url).query(query).send().await?;
        check_status(response)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))
    }

    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value, ToolError> {
        let url = format!("{}/{}", SUMMARY_URL, symbol);
        let crumb = self.crumb(false).await?;

        match self.get_json(&url, &summary_query(modules, &crumb)).await {
            Err(ToolError::Status { status: 401, .. }) => {
                debug!("Yahoo crumb rejected, refreshing");
                let crumb = self.crumb(true).await?;
                self.get_json(&url, &summary_query(modules, &crumb)).await
            }
            other => other,
        }
    }

    pub async fn current_price(&self, symbol: &str) -> Result<Value, ToolError> {
        let url = format!("{}/{}", CHART_URL, symbol);
        let body = self
            .get_json(&url, &[("interval", "1d".to_string()), ("range", "1d".to_string())])
            .await?;
        parse_price(&body)
    }

    pub async fn analyst_recommendations(&self, symbol: &str) -> Result<Value, ToolError> {
        let body = self.quote_summary(symbol, "recommendationTrend").await?;
        parse_recommendations(&body)
    }

    pub async fn company_info(&self, symbol: &str) -> Result<Value, ToolError> {
        let body = self
            .quote_summary(symbol, "assetProfile,price,summaryDetail,financialData")
            .await?;
        parse_company_info(&body)
    }

    pub async fn company_news(&self, symbol: &str, num_stories: usize) -> Result<Value, ToolError> {
        let body = self
            .get_json(
                SEARCH_URL,
                &[
                    ("q", symbol.to_string()),
                    ("newsCount", num_stories.to_string()),
                    ("quotesCount", "0".to_string()),
                ],
            )
            .await?;
        Ok(parse_news(&body, num_stories))
    }
}

#[async_trait]
impl Tool for MarketDataTools {
    fn kind(&self) -> ToolKind {
        ToolKind::MarketData
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let symbol_only = json!({
            "type": "object",
            "properties": {
                "symbol": {"type": "string", "description": "Stock ticker symbol, e.g. AAPL"}
            },
            "required": ["symbol"]
        });

        vec![
            ToolDefinition::new(
                "get_current_stock_price",
                "Get the current stock price and day change for a ticker symbol.",
                symbol_only.clone(),
            ),
            ToolDefinition::new(
                "get_analyst_recommendations",
                "Get analyst buy/hold/sell recommendation counts for a ticker symbol.",
                symbol_only.clone(),
            ),
            ToolDefinition::new(
                "get_company_info",
                "Get company profile, sector, market cap and key financials for a ticker symbol.",
                symbol_only,
            ),
            ToolDefinition::new(
                "get_company_news",
                "Get the latest news stories about a company.",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string", "description": "Stock ticker symbol"},
                        "num_stories": {"type": "integer", "description": "Number of stories (default 3)"}
                    },
                    "required": ["symbol"]
                }),
            ),
        ]
    }

    async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError> {
        let value = match function {
            "get_current_stock_price" => self.current_price(&symbol_arg(input)?).await?,
            "get_analyst_recommendations" => {
                self.analyst_recommendations(&symbol_arg(input)?).await?
            }
            "get_company_info" => self.company_info(&symbol_arg(input)?).await?,
            "get_company_news" => {
                let symbol = symbol_arg(input)?;
                let num_stories = count_arg(input, "num_stories", 3, 10);
                self.company_news(&symbol, num_stories).await?
            }
            other => return Err(ToolError::UnknownFunction(other.to_string())),
        };

        Ok(value.to_string())
    }
}

fn symbol_arg(input: &Value) -> Result<String, ToolError> {
    validate_symbol(required_str(input, "symbol")?)
}

fn summary_query(modules: &str, crumb: &str) -> [(&'static str, String); 2] {
    [("modules", modules.to_string()), ("crumb", crumb.to_string())]
}

/// Validate the body of a getcrumb response
pub fn parse_crumb(body: &str) -> Result<String, ToolError> {
    let crumb = body.trim();
    if crumb.is_empty() || crumb.len() > 64 || crumb.contains(|c: char| c.is_whitespace() || c == '<') {
        return Err(ToolError::Parse("Yahoo returned no crumb".to_string()));
    }
    Ok(crumb.to_string())
}

fn validate_symbol(symbol: &str) -> Result<String, ToolError> {
    let symbol = symbol.trim();
    if SYMBOL_REGEX.is_match(symbol) {
        Ok(symbol.to_uppercase())
    } else {
        Err(ToolError::InvalidInput(format!("invalid ticker symbol '{}'", symbol)))
    }
}

/// Extract price fields from a chart response
pub fn parse_price(body: &Value) -> Result<Value, ToolError> {
    let meta = body
        .pointer("/chart/result/0/meta")
        .ok_or_else(|| ToolError::Parse(api_error(body, "/chart/error")))?;

    let price = meta["regularMarketPrice"]
        .as_f64()
        .ok_or_else(|| ToolError::Parse("missing regularMarketPrice".to_string()))?;
    let previous = meta["chartPreviousClose"]
        .as_f64()
        .or_else(|| meta["previousClose"].as_f64());
    let change_percent = previous
        .filter(|p| *p != 0.0)
        .map(|p| ((price - p) / p * 10_000.0).round() / 100.0);

    Ok(json!({
        "symbol": meta["symbol"],
        "price": price,
        "currency": meta["currency"],
        "previous_close": previous,
        "change_percent": change_percent,
        "exchange": meta["exchangeName"],
    }))
}

/// Extract the recommendation trend table
pub fn parse_recommendations(body: &Value) -> Result<Value, ToolError> {
    let trend = body
        .pointer("/quoteSummary/result/0/recommendationTrend/trend")
        .and_then(Value::as_array)
        .ok_or_else(|| ToolError::Parse(api_error(body, "/quoteSummary/error")))?;

    let rows: Vec<Value> = trend
        .iter()
        .map(|row| {
            json!({
                "period": row["period"],
                "strong_buy": row["strongBuy"],
                "buy": row["buy"],
                "hold": row["hold"],
                "sell": row["sell"],
                "strong_sell": row["strongSell"],
            })
        })
        .collect();

    Ok(Value::Array(rows))
}

/// Flatten the profile modules into one object
pub fn parse_company_info(body: &Value) -> Result<Value, ToolError> {
    let result = body
        .pointer("/quoteSummary/result/0")
        .ok_or_else(|| ToolError::Parse(api_error(body, "/quoteSummary/error")))?;

    // Numeric fields come wrapped as {"raw": 1.0, "fmt": "1.00"}
    let raw = |path: &str| -> Value {
        result
            .pointer(path)
            .map(|v| v.get("raw").cloned().unwrap_or_else(|| v.clone()))
            .unwrap_or(Value::Null)
    };

    Ok(json!({
        "name": raw("/price/longName"),
        "symbol": raw("/price/symbol"),
        "current_price": raw("/financialData/currentPrice"),
        "currency": raw("/price/currency"),
        "market_cap": raw("/price/marketCap"),
        "sector": raw("/assetProfile/sector"),
        "industry": raw("/assetProfile/industry"),
        "website": raw("/assetProfile/website"),
        "employees": raw("/assetProfile/fullTimeEmployees"),
        "summary": raw("/assetProfile/longBusinessSummary"),
        "pe_ratio": raw("/summaryDetail/trailingPE"),
        "dividend_yield": raw("/summaryDetail/dividendYield"),
        "fifty_two_week_low": raw("/summaryDetail/fiftyTwoWeekLow"),
        "fifty_two_week_high": raw("/summaryDetail/fiftyTwoWeekHigh"),
        "recommendation": raw("/financialData/recommendationKey"),
        "target_mean_price": raw("/financialData/targetMeanPrice"),
    }))
}

/// Extract news stories from a search response
pub fn parse_news(body: &Value, limit: usize) -> Value {
    let stories: Vec<Value> = body["news"]
        .as_array()
        .map(|news| {
            news.iter()
                .take(limit)
                .map(|story| {
                    json!({
                        "title": story["title"],
                        "publisher": story["publisher"],
                        "link": story["link"],
                        "published_at": story["providerPublishTime"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Value::Array(stories)
}

fn api_error(body: &Value, pointer: &str) -> String {
    body.pointer(pointer)
        .and_then(|e| e["description"].as_str())
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unexpected response shape".to_string())
}
