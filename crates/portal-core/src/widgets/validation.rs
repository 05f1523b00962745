//! Field-level form checks. Every check passes on an empty value except
//! `Required`, so rules compose.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::PortalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Email,
    MinLength(usize),
    MaxLength(usize),
    Number,
    PositiveNumber,
    Date,
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

pub fn is_empty(value: &str) -> bool {
    value.trim().is_empty()
}

/// Returns the message for a failed rule, `None` when the value passes.
pub fn check(rule: &Rule, value: &str, field: &str) -> Option<String> {
    if !matches!(rule, Rule::Required) && is_empty(value) {
        return None;
    }
    match rule {
        Rule::Required => is_empty(value).then(|| format!("{field} zorunludur")),
        Rule::Email => {
            let valid = match email_regex() {
                Some(re) => re.is_match(value.trim()),
                None => value.contains('@'),
            };
            (!valid).then(|| "Geçerli bir email adresi giriniz".to_string())
        }
        Rule::MinLength(min) => (value.chars().count() < *min)
            .then(|| format!("{field} en az {min} karakter olmalıdır")),
        Rule::MaxLength(max) => (value.chars().count() > *max)
            .then(|| format!("{field} en fazla {max} karakter olmalıdır")),
        Rule::Number => value
            .trim()
            .parse::<f64>()
            .is_err()
            .then(|| format!("{field} sayı olmalıdır")),
        Rule::PositiveNumber => match value.trim().parse::<f64>() {
            Err(_) => Some(format!("{field} sayı olmalıdır")),
            Ok(n) if n < 0.0 => Some(format!("{field} pozitif bir sayı olmalıdır")),
            Ok(_) => None,
        },
        Rule::Date => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .is_err()
            .then(|| format!("{field} geçerli bir tarih olmalıdır")),
    }
}

pub fn date_range(from: NaiveDate, to: NaiveDate) -> Option<String> {
    (to < from).then(|| "Bitiş tarihi başlangıç tarihinden önce olamaz".to_string())
}

/// Field name to its failed-rule messages.
pub type FormErrors = BTreeMap<String, Vec<String>>;

pub fn validate_form(
    data: &BTreeMap<String, String>,
    rules: &[(&str, &str, Vec<Rule>)],
) -> FormErrors {
    let mut errors = FormErrors::new();
    for (field, label, field_rules) in rules {
        let value = data.get(*field).map(String::as_str).unwrap_or("");
        for rule in field_rules {
            if let Some(message) = check(rule, value, label) {
                errors.entry(field.to_string()).or_default().push(message);
            }
        }
    }
    errors
}

impl From<FormErrors> for PortalError {
    fn from(errors: FormErrors) -> Self {
        PortalError::Validation(errors.into_values().flatten().collect())
    }
}
