//! Pure helpers shared by the billing services.
//!
//! The price resolver, the billing-start resolver and the aggregation engine
//! all normalize the same free-text columns and round money the same way;
//! keeping the helpers in one place keeps every call site consistent.

use chrono::{Datelike, NaiveDate};
use shared::{CallerRole, Concept, Level, PaymentKind};

/// Trim, uppercase and strip the diacritics that occur in the store's data,
/// so `"Inscripción"` and `"INSCRIPCION"` compare equal.
pub fn norm(s: &str) -> String {
    s.trim().chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'Á' | 'à' | 'À' | 'ä' | 'Ä' => 'A',
        'é' | 'É' | 'è' | 'È' | 'ë' | 'Ë' => 'E',
        'í' | 'Í' | 'ì' | 'Ì' | 'ï' | 'Ï' => 'I',
        'ó' | 'Ó' | 'ò' | 'Ò' | 'ö' | 'Ö' => 'O',
        'ú' | 'Ú' | 'ù' | 'Ù' | 'ü' | 'Ü' => 'U',
        'ñ' | 'Ñ' => 'N',
        _ => c.to_ascii_uppercase(),
    }
}

/// Round to currency cents. Applied at every aggregation step so results do
/// not depend on the order amounts are combined in.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// First day of the date's month.
pub fn month_start(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}

/// `YYYY-MM` bucket key for monthly series.
pub fn month_key(d: NaiveDate) -> String {
    format!("{:04}-{:02}", d.year(), d.month())
}

fn next_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(d)
}

/// Inclusive, contiguous list of `YYYY-MM` keys from `from` through `to`;
/// empty when `to` is an earlier month.
pub fn month_sequence(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let mut keys = Vec::new();
    let mut cur = month_start(from);
    let end = month_start(to);
    while cur <= end {
        keys.push(month_key(cur));
        cur = next_month(cur);
    }
    keys
}

/// `"  efectivo "` → `"Efectivo"`; merges free-text payment methods that
/// differ only in casing or spacing.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Parse the store's level column.
pub fn parse_level(raw: &str) -> Level {
    match norm(raw).as_str() {
        "PREESCOLAR" => Level::Preschool,
        "PRIMARIA" => Level::Primary,
        _ => Level::Other,
    }
}

/// Parse a price/calendar concept column. Unknown concepts yield `None` and
/// the row is ignored by the billing math.
pub fn parse_concept(raw: &str) -> Option<Concept> {
    match norm(raw).as_str() {
        "COLEGIATURA" => Some(Concept::Tuition),
        "INSCRIPCION" | "INS" => Some(Concept::Enrollment),
        _ => None,
    }
}

/// Parse the free-text payment type typed at the register.
pub fn parse_payment_kind(raw: &str) -> PaymentKind {
    match norm(raw).as_str() {
        "COLEGIATURA" => PaymentKind::Tuition,
        "INSCRIPCION" => PaymentKind::Enrollment,
        _ => PaymentKind::Other,
    }
}

/// Parse the session-layer role header.
pub fn parse_role(raw: &str) -> Option<CallerRole> {
    match norm(raw).as_str() {
        "ADMIN" => Some(CallerRole::Admin),
        "SUBADMIN" => Some(CallerRole::Subadmin),
        "CAJA" => Some(CallerRole::Cashier),
        "PARENT" => Some(CallerRole::Guardian),
        _ => None,
    }
}
