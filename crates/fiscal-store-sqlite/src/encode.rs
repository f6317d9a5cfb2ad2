//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Decimals are stored as fixed-scale integers. Timestamps assigned by the
//! store are RFC 3339 UTC strings; document dates keep the offset they were
//! issued with. Addresses are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use fiscal_core::party::Address;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Decimal ─────────────────────────────────────────────────────────────────

/// Centavos.
pub const MONEY_SCALE: u32 = 2;
pub const QUANTITY_SCALE: u32 = 4;
/// Rates are percentages, e.g. `18.0000`.
pub const RATE_SCALE: u32 = 4;
pub const UNIT_PRICE_SCALE: u32 = 10;

/// Round half away from zero to `scale` places and return the mantissa.
pub fn encode_decimal(field: &str, value: Decimal, scale: u32) -> Result<i64> {
  let overflow = || Error::Overflow { field: field.to_owned(), value };
  let mut scaled = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
  scaled.rescale(scale);
  if scaled.scale() != scale {
    return Err(overflow());
  }
  i64::try_from(scaled.mantissa()).map_err(|_| overflow())
}

pub fn decode_decimal(raw: i64, scale: u32) -> Decimal { Decimal::new(raw, scale) }

pub fn encode_money(field: &str, value: Decimal) -> Result<i64> {
  encode_decimal(field, value, MONEY_SCALE)
}

pub fn decode_money(raw: i64) -> Decimal { decode_decimal(raw, MONEY_SCALE) }

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  decode_local_dt(s).map(|dt| dt.with_timezone(&Utc))
}

pub fn encode_local_dt(dt: &DateTime<FixedOffset>) -> String { dt.to_rfc3339() }

pub fn decode_local_dt(s: &str) -> Result<DateTime<FixedOffset>> {
  DateTime::parse_from_rfc3339(s).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Address ─────────────────────────────────────────────────────────────────

/// An empty address is stored as NULL.
pub fn encode_address(a: &Address) -> Result<Option<String>> {
  if *a == Address::default() {
    return Ok(None);
  }
  Ok(Some(serde_json::to_string(a)?))
}

pub fn decode_address(s: Option<&str>) -> Result<Address> {
  match s {
    Some(json) => Ok(serde_json::from_str(json)?),
    None => Ok(Address::default()),
  }
}

// ─── Small integers ──────────────────────────────────────────────────────────

pub fn decode_u32(column: &str, raw: i64) -> Result<u32> {
  u32::try_from(raw).map_err(|_| Error::Decode(format!("{column} = {raw}")))
}

pub fn decode_count(column: &str, raw: i64) -> Result<u64> {
  u64::try_from(raw).map_err(|_| Error::Decode(format!("{column} = {raw}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn money_rounds_half_away_from_zero() {
    let value: Decimal = "10.005".parse().unwrap();
    assert_eq!(encode_money("v", value).unwrap(), 1001);
    let value: Decimal = "10.004".parse().unwrap();
    assert_eq!(encode_money("v", value).unwrap(), 1000);
  }

  #[test]
  fn short_scale_is_widened() {
    let value: Decimal = "3".parse().unwrap();
    assert_eq!(encode_decimal("q", value, QUANTITY_SCALE).unwrap(), 30_000);
    assert_eq!(decode_decimal(30_000, QUANTITY_SCALE), value);
  }

  #[test]
  fn values_beyond_i64_overflow() {
    let value: Decimal = "99999999999999999999".parse().unwrap();
    match encode_money("valor_total_nf", value) {
      Err(Error::Overflow { field, .. }) => assert_eq!(field, "valor_total_nf"),
      other => panic!("expected overflow, got {other:?}"),
    }
  }

  #[test]
  fn local_dates_keep_their_offset() {
    let s = "2024-03-15T10:00:00-03:00";
    let dt = decode_local_dt(s).unwrap();
    assert_eq!(encode_local_dt(&dt), s);
    assert_eq!(&encode_local_dt(&dt)[..7], "2024-03");
  }

  #[test]
  fn empty_address_is_null() {
    assert_eq!(encode_address(&Address::default()).unwrap(), None);
    assert_eq!(decode_address(None).unwrap(), Address::default());
  }
}
