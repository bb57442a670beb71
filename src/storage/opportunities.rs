//! Opportunity source file.
//!
//! The scraper writes a JSON array of flat records (`bookmaker1`,
//! `team1_bk1`, ..., `odd_bk2`, `link_bk2`). Numbers may arrive as strings
//! and the profit as `"0.48%"`. Records already in the nested `legs` shape
//! are accepted too. Invalid records are skipped, not fatal.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bookmakers::AdapterRegistry;
use crate::types::{ArbError, Leg, Opportunity};

/// Flat record as the scraper emits it. Missing fields are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpportunityRecord {
    #[serde(deserialize_with = "text")]
    pub profit: String,
    #[serde(deserialize_with = "text")]
    pub sport: String,
    #[serde(deserialize_with = "text")]
    pub event_time: String,

    #[serde(deserialize_with = "text")]
    pub bookmaker1: String,
    #[serde(deserialize_with = "text")]
    pub team1_bk1: String,
    #[serde(deserialize_with = "text")]
    pub team2_bk1: String,
    #[serde(deserialize_with = "text")]
    pub league_bk1: String,
    #[serde(deserialize_with = "text")]
    pub bet_type_bk1: String,
    #[serde(deserialize_with = "text")]
    pub odd_bk1: String,
    #[serde(deserialize_with = "text")]
    pub link_bk1: String,

    #[serde(deserialize_with = "text")]
    pub bookmaker2: String,
    #[serde(deserialize_with = "text")]
    pub team1_bk2: String,
    #[serde(deserialize_with = "text")]
    pub team2_bk2: String,
    #[serde(deserialize_with = "text")]
    pub league_bk2: String,
    #[serde(deserialize_with = "text")]
    pub bet_type_bk2: String,
    #[serde(deserialize_with = "text")]
    pub odd_bk2: String,
    #[serde(deserialize_with = "text")]
    pub link_bk2: String,
}

/// Accept strings, numbers and null as text.
fn text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Parse `"2.10"`, `"0.48%"` or `"1e1"`.
fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

impl TryFrom<OpportunityRecord> for Opportunity {
    type Error = ArbError;

    fn try_from(r: OpportunityRecord) -> std::result::Result<Self, Self::Error> {
        let odd = |raw: &str, field: &str| {
            parse_decimal(raw)
                .ok_or_else(|| ArbError::InvalidOpportunity(format!("{field} is not a number: {raw:?}")))
        };

        let opportunity = Opportunity {
            profit_percent: parse_decimal(&r.profit).unwrap_or(Decimal::ZERO),
            sport: r.sport,
            event_time: r.event_time,
            legs: [
                Leg {
                    bookmaker: AdapterRegistry::normalize_id(&r.bookmaker1),
                    team1: r.team1_bk1,
                    team2: r.team2_bk1,
                    league: r.league_bk1,
                    bet_type: r.bet_type_bk1,
                    odd: odd(&r.odd_bk1, "odd_bk1")?,
                    link: r.link_bk1,
                },
                Leg {
                    bookmaker: AdapterRegistry::normalize_id(&r.bookmaker2),
                    team1: r.team1_bk2,
                    team2: r.team2_bk2,
                    league: r.league_bk2,
                    bet_type: r.bet_type_bk2,
                    odd: odd(&r.odd_bk2, "odd_bk2")?,
                    link: r.link_bk2,
                },
            ],
        };
        validate(&opportunity)?;
        Ok(opportunity)
    }
}

/// Reject opportunities the engine cannot act on.
pub fn validate(opportunity: &Opportunity) -> std::result::Result<(), ArbError> {
    let invalid = |msg: String| Err(ArbError::InvalidOpportunity(msg));

    for (i, leg) in opportunity.legs.iter().enumerate() {
        let n = i + 1;
        if leg.bookmaker.is_empty() {
            return invalid(format!("bookmaker{n} is empty"));
        }
        for (field, value) in [
            ("team1", &leg.team1),
            ("team2", &leg.team2),
            ("link", &leg.link),
        ] {
            if value.trim().is_empty() || value.trim().eq_ignore_ascii_case("unknown") {
                return invalid(format!("{field}_bk{n} is missing or unknown"));
            }
        }
        if leg.odd <= Decimal::ONE {
            return invalid(format!("odd_bk{n} {} is not above 1", leg.odd));
        }
    }

    if opportunity.legs[0].bookmaker == opportunity.legs[1].bookmaker {
        return invalid(format!(
            "both legs on the same bookmaker ({})",
            opportunity.legs[0].bookmaker
        ));
    }
    Ok(())
}

fn parse_record(value: Value) -> std::result::Result<Opportunity, String> {
    if value.get("legs").is_some() {
        let mut opportunity: Opportunity =
            serde_json::from_value(value).map_err(|e| e.to_string())?;
        for leg in opportunity.legs.iter_mut() {
            leg.bookmaker = AdapterRegistry::normalize_id(&leg.bookmaker);
        }
        validate(&opportunity).map_err(|e| e.to_string())?;
        return Ok(opportunity);
    }

    let record: OpportunityRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Opportunity::try_from(record).map_err(|e| e.to_string())
}

/// Parse the contents of an opportunity file. Invalid records are skipped.
pub fn parse_opportunities(json: &str) -> Result<Vec<Opportunity>> {
    let records: Vec<Value> =
        serde_json::from_str(json).context("Opportunity file is not a JSON array")?;

    let total = records.len();
    let mut opportunities = Vec::with_capacity(total);
    for (index, value) in records.into_iter().enumerate() {
        match parse_record(value) {
            Ok(opp) => {
                debug!(index, opportunity = %opp, "Opportunity loaded");
                opportunities.push(opp);
            }
            Err(reason) => warn!(index, reason = %reason, "Skipping invalid opportunity record"),
        }
    }

    if opportunities.len() < total {
        info!(
            loaded = opportunities.len(),
            skipped = total - opportunities.len(),
            "Opportunity records filtered"
        );
    }
    Ok(opportunities)
}

/// Load opportunities from `path`, in file order.
/// A missing file means no opportunities.
pub fn load_opportunities(path: &Path) -> Result<Vec<Opportunity>> {
    if !path.exists() {
        warn!(path = %path.display(), "Opportunity file not found");
        return Ok(Vec::new());
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read opportunities from {}", path.display()))?;

    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    parse_opportunities(&json)
        .with_context(|| format!("Failed to parse opportunities from {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
