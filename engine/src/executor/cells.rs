//! Result cell canonicalization
//!
//! Every value is read as raw wire bytes and decoded by its column type, so
//! one path covers built-in types, domains and enums alike.

use std::error::Error;
use bytes::Buf;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{FromSql, Kind, Type};
use tokio_postgres::Row;

use sql_judge_core::Cell;

type BoxError = Box<dyn Error + Sync + Send>;

/// Undecoded column value
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawValue(raw))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary `NUMERIC` exactly, with `dscale` fractional digits
pub(crate) fn decode_numeric(mut raw: &[u8]) -> Result<String, BoxError> {
    if raw.remaining() < 8 {
        return Err("numeric value is too short".into());
    }
    let ndigits = raw.get_i16();
    let weight = i32::from(raw.get_i16());
    let sign = raw.get_u16();
    let dscale = usize::from(raw.get_u16());

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04x}", other).into()),
    }
    if ndigits < 0 || raw.remaining() < ndigits as usize * 2 {
        return Err("numeric digits are truncated".into());
    }
    let digits: Vec<i16> = (0..ndigits).map(|_| raw.get_i16()).collect();

    // Digit i is a base-10000 group with weight `weight - i`
    let group = |power: i32| -> i16 {
        let index = weight - power;
        if index < 0 {
            0
        } else {
            digits.get(index as usize).copied().unwrap_or(0)
        }
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(weight).to_string());
        for power in (0..weight).rev() {
            text.push_str(&format!("{:04}", group(power)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut power = -1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(power)));
            power -= 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

/// Shortest text that reads back as the same float
fn float_text<F: Into<f64> + ToString + Copy>(value: F) -> String {
    let wide: f64 = value.into();
    if wide.is_nan() {
        "NaN".to_string()
    } else if wide.is_infinite() {
        if wide > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        value.to_string()
    }
}

fn decode<'a, T: FromSql<'a>>(ty: &Type, raw: &'a [u8]) -> Result<T, BoxError> {
    T::from_sql(ty, raw)
}

/// Decode one non-null value of type `ty`
pub(crate) fn cell_from_raw(ty: &Type, raw: &[u8]) -> Result<Cell, BoxError> {
    if let Kind::Domain(base) = ty.kind() {
        return cell_from_raw(base, raw);
    }
    if let Kind::Enum(_) = ty.kind() {
        return Ok(Cell::Text(std::str::from_utf8(raw)?.to_string()));
    }

    let cell = match *ty {
        Type::INT2 => Cell::Int(i64::from(decode::<i16>(ty, raw)?)),
        Type::INT4 => Cell::Int(i64::from(decode::<i32>(ty, raw)?)),
        Type::INT8 => Cell::Int(decode::<i64>(ty, raw)?),
        Type::OID => Cell::Int(i64::from(decode::<u32>(ty, raw)?)),
        Type::NUMERIC => Cell::decimal(&decode_numeric(raw)?),
        Type::FLOAT4 => Cell::decimal(&float_text(decode::<f32>(ty, raw)?)),
        Type::FLOAT8 => Cell::decimal(&float_text(decode::<f64>(ty, raw)?)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Cell::Text(decode::<String>(ty, raw)?)
        }
        Type::CHAR => Cell::Text(char::from(decode::<i8>(ty, raw)? as u8).to_string()),
        Type::BOOL => Cell::Text(decode::<bool>(ty, raw)?.to_string()),
        Type::UUID => Cell::Text(decode::<uuid::Uuid>(ty, raw)?.to_string()),
        Type::JSON | Type::JSONB => Cell::Text(decode::<serde_json::Value>(ty, raw)?.to_string()),
        Type::DATE => Cell::Date(decode::<NaiveDate>(ty, raw)?.format("%Y-%m-%d").to_string()),
        Type::TIMESTAMP => Cell::Date(
            decode::<NaiveDateTime>(ty, raw)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        Type::TIMESTAMPTZ => Cell::Date(
            decode::<DateTime<Utc>>(ty, raw)?
                .format("%Y-%m-%dT%H:%M:%S%.f+00:00")
                .to_string(),
        ),
        Type::TIME => Cell::Date(decode::<NaiveTime>(ty, raw)?.format("%H:%M:%S%.f").to_string()),
        Type::BYTEA => Cell::Bytes(decode::<Vec<u8>>(ty, raw)?),
        _ => Cell::Bytes(raw.to_vec()),
    };
    Ok(cell)
}

/// Decode column `index` of `row`
pub(crate) fn decode_cell(row: &Row, index: usize) -> Result<Cell, BoxError> {
    let ty = row.columns()[index].type_();
    match row.try_get::<_, Option<RawValue>>(index)? {
        Some(RawValue(raw)) => cell_from_raw(ty, raw),
        None => Ok(Cell::Null),
    }
}

/// Decode a whole row
pub(crate) fn decode_row(row: &Row) -> Result<Vec<Cell>, BoxError> {
    (0..row.len()).map(|i| decode_cell(row, i)).collect()
}
