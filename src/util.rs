use crate::{ArcStr, ContactDate, PatientId, Reading};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer};

// Helpers for serde to parse fields with quirks.

/// Tokens that spreadsheet exports use for an empty cell.
fn is_missing(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("nan")
}

/// Parse a string, but map "null" and "nan" to `None` (in addition to the default "" -> None
/// mapping)
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    if is_missing(&s) {
        Ok(None)
    } else {
        Ok(Some(s.into()))
    }
}

/// Parse a patient identifier.
///
/// Identifiers are integers, but pandas-style exports write them as `17.0` when the column has
/// gaps, so integral floats are accepted too.
pub fn opt_patient_id<'de, D>(d: D) -> Result<Option<PatientId>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_missing(s) {
        return Ok(None);
    }
    if let Ok(id) = s.parse::<PatientId>() {
        return Ok(Some(id));
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0. && v.fract() == 0. && v <= u32::MAX as f64 => {
            Ok(Some(v as PatientId))
        }
        _ => Err(de::Error::custom(format!("invalid patient identifier \"{}\"", s))),
    }
}

/// Parse a number. Text that is not a finite number is kept as invalid.
pub fn number<'de, D>(d: D) -> Result<Reading<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_missing(s) {
        return Ok(Reading::Missing);
    }
    Ok(match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Reading::Valid(v),
        _ => Reading::Invalid(s.into()),
    })
}

/// parse a '1' to `true` and a '0' to `false` (also '1.0' and '0.0'). Anything else is kept as
/// invalid.
pub fn flag_01<'de, D>(d: D) -> Result<Reading<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_missing(s) {
        return Ok(Reading::Missing);
    }
    Ok(match s {
        "0" | "0.0" => Reading::Valid(false),
        "1" | "1.0" => Reading::Valid(true),
        _ => Reading::Invalid(s.into()),
    })
}

/// Parse a contact date.
///
/// Accepted formats are ISO (`2021-03-04`, optionally with a time), German (`04.03.2021`) and
/// day-first with slashes (`04/03/2021`, optionally with a time). Times are discarded. Anything
/// else is kept as an invalid date rather than failing the load.
pub fn contact_date<'de, D>(d: D) -> Result<ContactDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(d)?;
    if is_missing(s) {
        return Ok(ContactDate::Missing);
    }
    Ok(match parse_date(s) {
        Some(date) => ContactDate::Valid(date),
        None => ContactDate::Invalid(s.into()),
    })
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

// error printing helper.
//
pub trait ResultExt {
    fn print_error(self) -> Self;
}

impl<T> ResultExt for Result<T, anyhow::Error> {
    fn print_error(self) -> Self {
        match self {
            Ok(v) => Ok(v),
            Err(error) => {
                println!("error: {}", error);
                let mut err: &dyn std::error::Error = error.as_ref();
                while let Some(cause) = err.source() {
                    println!("caused by: {}", cause);
                    err = cause;
                }
                Err(error)
            }
        }
    }
}

pub fn header(header: &str) {
    let len = header.chars().count();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4);
        for input in [
            "2021-03-04",
            "2021-03-04 10:15:00",
            "2021-03-04T10:15:00",
            "04.03.2021",
            "04/03/2021",
            "04/03/2021 00:00:00",
        ] {
            assert_eq!(parse_date(input), expected, "{}", input);
        }
        assert_eq!(parse_date("2021-13-01"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn missing_tokens() {
        assert!(is_missing(""));
        assert!(is_missing("NULL"));
        assert!(is_missing("NaN"));
        assert!(!is_missing("0"));
    }
}
