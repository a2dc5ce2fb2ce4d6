use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::DateTime;
use ethers::types::{H256, U256};

use crate::{error::Error, types::MAX_DONATION_BPS};

pub fn parse_tuple_string(data: String) -> Vec<String> {
    let data = data.trim();
    if data.len() < 2 {
        return vec![];
    }

    let str = &data[1..];
    let splited = str.split(",(");
    let mut items: Vec<String> = Vec::new();

    for c in splited {
        if let Some(index) = c.find(')') {
            let tuple_data = &c[0..index];
            items.push(tuple_data.to_owned());
        }
    }

    items
}

fn decimals_factor(decimals: u32) -> Result<BigDecimal, Error> {
    let factor = 10u64.checked_pow(decimals).ok_or_else(|| {
        Error::ValidationError(format!("Unsupported decimals {}", decimals))
    })?;
    Ok(BigDecimal::from(factor))
}

/// Parses a human amount such as `"100.50"` into raw token units.
pub fn parse_units(value: &str, decimals: u32) -> Result<U256, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(U256::zero());
    }

    let amount = BigDecimal::from_str(value).map_err(|_| {
        Error::ValidationError(format!("Invalid amount {}", value))
    })?;

    if amount < BigDecimal::from(0) {
        return Err(Error::ValidationError(format!(
            "Amount cannot be negative: {}",
            value
        )));
    }

    let scaled = amount * decimals_factor(decimals)?;
    let integer = scaled.with_scale(0);

    if integer != scaled {
        return Err(Error::ValidationError(format!(
            "Amount {} has more than {} decimals",
            value, decimals
        )));
    }

    U256::from_dec_str(&integer.to_string()).map_err(|_| {
        Error::ValidationError(format!("Amount {} is out of range", value))
    })
}

/// Renders raw token units with two fraction digits and thousands
/// separators, e.g. `1234500000` with 6 decimals as `1,234.50`.
pub fn format_token_amount<T: ToString>(
    amount: &T,
    decimals: u32,
) -> Result<String, Error> {
    let value = BigDecimal::from_str(&amount.to_string())?;
    let value = (value / decimals_factor(decimals)?).round(2).with_scale(2);
    let value = value.to_string();

    let (integer, fraction) = match value.split_once('.') {
        Some((i, f)) => (i.to_owned(), f.to_owned()),
        None => (value, String::from("00")),
    };

    let mut grouped = String::new();
    for (index, c) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    Ok(format!("{}.{}", grouped, fraction))
}

pub fn format_timestamp(timestamp: U256) -> Result<String, Error> {
    if timestamp > U256::from(i64::MAX as u64) {
        return Err(Error::ValidationError(format!(
            "Timestamp {} is out of range",
            timestamp
        )));
    }

    let seconds = timestamp.low_u64() as i64;
    let date = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        Error::ValidationError(format!("Timestamp {} is out of range", seconds))
    })?;

    Ok(date.format("%b %-d, %Y, %I:%M %p").to_string())
}

/// First ten characters of the transaction hash, `0x` included.
pub fn truncate_hash(hash: &H256) -> String {
    let full = format!("{:?}", hash);
    format!("{}...", &full[..10.min(full.len())])
}

/// UI shares are whole percentages; the contract expects basis points.
pub fn percent_to_bps(percent: u16) -> Result<u16, Error> {
    let bps = percent.checked_mul(100).unwrap_or(u16::MAX);
    if bps > MAX_DONATION_BPS {
        return Err(Error::ValidationError(format!(
            "Donation share {}% is above 100%",
            percent
        )));
    }
    Ok(bps)
}
