use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::blocklist::{is_market_blocked, BlockResult};
use crate::config::{
    Config, GAMMA_MAX_OFFSET, GAMMA_PAGE_SIZE, GAMMA_TIMEOUT_SECS, SYNC_MIN_VOLUME_USD,
};
use crate::error::{AppError, Result};
use crate::types::Market;

/// A parsed market plus the outcome prices Gamma reported alongside it.
#[derive(Debug, Clone)]
pub struct MarketWithPrices {
    pub market: Market,
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
}

#[derive(Debug, Default)]
pub struct FetchStats {
    pub events_total: usize,
    pub markets_total: usize,
    pub rejected_blocked: usize,
    pub rejected_closed: usize,
    pub rejected_low_volume: usize,
    pub rejected_no_tokens: usize,
    pub qualified: usize,
}

/// Fetch every active event from Gamma and flatten its markets, applying the blocklist
/// and the sync-time quality filters. Pages until a short page or the offset safety limit.
pub async fn fetch_active_markets(
    cfg: &Config,
    blocklist_categories: &[String],
    blocklist_keywords: &[String],
) -> Result<(Vec<MarketWithPrices>, FetchStats)> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(GAMMA_TIMEOUT_SECS))
        .build()?;

    let mut results = Vec::new();
    let mut stats = FetchStats::default();
    let mut offset = 0usize;

    loop {
        let url = format!(
            "{}/events?active=true&closed=false&limit={}&offset={}",
            cfg.gamma_api_url, GAMMA_PAGE_SIZE, offset
        );

        let resp: serde_json::Value = client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let events = match resp.as_array() {
            Some(a) => a,
            None => {
                return Err(AppError::Bootstrap(
                    "GAMMA /events response was not an array".to_string(),
                ))
            }
        };

        if events.is_empty() {
            break;
        }
        stats.events_total += events.len();

        for event in events {
            collect_event_markets(
                event,
                blocklist_categories,
                blocklist_keywords,
                &mut results,
                &mut stats,
            );
        }

        match next_page_offset(offset, events.len()) {
            Some(next) => offset = next,
            None => break,
        }
    }

    stats.qualified = results.len();
    info!(
        events = stats.events_total,
        markets = stats.markets_total,
        qualified = stats.qualified,
        "Fetched active markets with prices"
    );
    Ok((results, stats))
}

/// Offset of the next `/events` page, or None once a short page arrives or the
/// offset would pass the safety limit.
fn next_page_offset(offset: usize, page_len: usize) -> Option<usize> {
    if page_len < GAMMA_PAGE_SIZE {
        return None;
    }
    let next = offset + GAMMA_PAGE_SIZE;
    if next > GAMMA_MAX_OFFSET {
        warn!("Reached safety limit of {GAMMA_MAX_OFFSET} events, stopping pagination");
        return None;
    }
    Some(next)
}

/// Parse all markets nested under one Gamma event into `out`.
fn collect_event_markets(
    event: &serde_json::Value,
    blocklist_categories: &[String],
    blocklist_keywords: &[String],
    out: &mut Vec<MarketWithPrices>,
    stats: &mut FetchStats,
) {
    let category = event_category(event);
    let event_slug = event.get("slug").and_then(|s| s.as_str()).unwrap_or("");

    let Some(raw_markets) = event.get("markets").and_then(|m| m.as_array()) else {
        return;
    };

    for raw in raw_markets {
        stats.markets_total += 1;
        let question = raw.get("question").and_then(|q| q.as_str()).unwrap_or("");

        let block = is_market_blocked(question, &category, blocklist_categories, blocklist_keywords);
        if let BlockResult::Blocked { reason, matched_value } = block {
            debug!(
                market_id = raw.get("id").and_then(|v| v.as_str()).unwrap_or("?"),
                %reason,
                matched = %matched_value,
                "Market blocked by filter"
            );
            stats.rejected_blocked += 1;
            continue;
        }

        match parse_gamma_market_checked(raw, &category, event_slug) {
            Ok(parsed) => out.push(parsed),
            Err(Rejection::Closed) => stats.rejected_closed += 1,
            Err(Rejection::LowVolume) => stats.rejected_low_volume += 1,
            Err(Rejection::NoTokens) => stats.rejected_no_tokens += 1,
        }
    }
}

/// Label of the first tag when the event has tags, else the event `category` field.
/// Either falls back to "Unknown" when empty.
pub fn event_category(event: &serde_json::Value) -> String {
    let category = match event.get("tags").and_then(|t| t.as_array()) {
        Some(tags) if !tags.is_empty() => tags[0].get("label").and_then(|l| l.as_str()),
        _ => event.get("category").and_then(|c| c.as_str()),
    };
    category
        .filter(|c| !c.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    Closed,
    LowVolume,
    NoTokens,
}

fn parse_gamma_market_checked(
    v: &serde_json::Value,
    category: &str,
    event_slug: &str,
) -> std::result::Result<MarketWithPrices, Rejection> {
    if v.get("closed").and_then(|c| c.as_bool()).unwrap_or(false) {
        return Err(Rejection::Closed);
    }

    let volume = number_field(v, "volumeNum")
        .or_else(|| number_field(v, "volume24hr"))
        .unwrap_or(0.0);
    if volume < SYNC_MIN_VOLUME_USD {
        return Err(Rejection::LowVolume);
    }

    let token_ids: Vec<String> = json_string_list(v, "clobTokenIds");
    let yes_token_id = token_ids.first().cloned().unwrap_or_default();
    let no_token_id = token_ids.get(1).cloned().unwrap_or_default();
    if yes_token_id.is_empty() && no_token_id.is_empty() {
        return Err(Rejection::NoTokens);
    }

    let prices: Vec<String> = json_string_list(v, "outcomePrices");
    let yes_price = prices.first().and_then(|p| p.parse::<f64>().ok());
    let no_price = prices.get(1).and_then(|p| p.parse::<f64>().ok());

    let end_date = v
        .get("endDate")
        .and_then(|e| e.as_str())
        .and_then(parse_end_date)
        .or_else(|| {
            v.get("endDateIso")
                .and_then(|e| e.as_str())
                .and_then(parse_end_date)
        });

    let str_field = |key: &str| {
        v.get(key)
            .and_then(|s| s.as_str())
            .unwrap_or("")
            .to_string()
    };

    let market = Market {
        id: str_field("id"),
        condition_id: str_field("conditionId"),
        question: str_field("question"),
        slug: str_field("slug"),
        event_slug: event_slug.to_string(),
        category: category.to_string(),
        end_date,
        active: v.get("active").and_then(|a| a.as_bool()).unwrap_or(true),
        volume_24h: volume,
        yes_token_id,
        no_token_id,
    };

    Ok(MarketWithPrices {
        market,
        yes_price,
        no_price,
    })
}

/// Gamma encodes some list fields as JSON inside a string, e.g. `"[\"1\", \"2\"]"`.
fn json_string_list(v: &serde_json::Value, key: &str) -> Vec<String> {
    match v.get(key) {
        Some(serde_json::Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn number_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    v.get(key)
        .and_then(|x| x.as_f64().or_else(|| x.as_str().and_then(|s| s.parse().ok())))
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` (taken as midnight UTC).
pub fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
