//! Typed accessors over an action's raw JSON `config` object.
//!
//! Every accessor reports failures as [`ValidationError`] tagged with the
//! action kind and field name, so a template author sees exactly which key
//! is wrong.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::registry::ActionKind;
use crate::ValidationError;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// A closed set of string values accepted for one config key.
pub trait ConfigEnum: FromStr + Sized {
    const ALLOWED: &'static [&'static str];
}

pub(crate) struct ConfigReader<'a> {
    kind: ActionKind,
    config: &'a Map<String, Value>,
}

impl<'a> ConfigReader<'a> {
    pub(crate) fn new(kind: ActionKind, config: &'a Map<String, Value>) -> Self {
        Self { kind, config }
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        self.config.get(field).filter(|v| !v.is_null())
    }

    fn invalid_type(&self, field: &'static str, expected: &'static str) -> ValidationError {
        ValidationError::InvalidType {
            action: self.kind,
            field,
            expected,
        }
    }

    pub(crate) fn missing(&self, field: &'static str) -> ValidationError {
        ValidationError::MissingField {
            action: self.kind,
            field,
        }
    }

    pub(crate) fn invalid(&self, field: &'static str, reason: impl Into<String>) -> ValidationError {
        ValidationError::Invalid {
            action: self.kind,
            field,
            reason: reason.into(),
        }
    }

    /// A non-blank string.
    pub(crate) fn required_str(&self, field: &'static str) -> Result<String, ValidationError> {
        self.optional_str(field)?.ok_or_else(|| self.missing(field))
    }

    /// A string if present; blank strings count as absent.
    pub(crate) fn optional_str(&self, field: &'static str) -> Result<Option<String>, ValidationError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid_type(field, "a string")),
        }
    }

    /// One of `T::ALLOWED`, compared case-insensitively.
    pub(crate) fn required_enum<T: ConfigEnum>(&self, field: &'static str) -> Result<T, ValidationError> {
        let raw = self.required_str(field)?;
        raw.trim().parse::<T>().map_err(|_| ValidationError::NotAllowed {
            action: self.kind,
            field,
            value: raw.clone(),
            allowed: T::ALLOWED,
        })
    }

    /// An integer in `[min, max]`; numeric strings are accepted.
    pub(crate) fn int_in_range(
        &self,
        field: &'static str,
        min: i64,
        max: i64,
        default: i64,
    ) -> Result<i64, ValidationError> {
        let value = match self.present(field) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(_) => None,
        }
        .ok_or_else(|| self.invalid_type(field, "an integer"))?;

        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ValidationError::OutOfRange {
                action: self.kind,
                field,
                min,
                max,
                value,
            })
        }
    }

    /// A boolean; `"true"`/`"false"`/`"1"`/`"0"` and `1`/`0` are accepted.
    pub(crate) fn bool_or(&self, field: &'static str, default: bool) -> Result<bool, ValidationError> {
        match self.present(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(true),
            Some(Value::Number(n)) if n.as_i64() == Some(0) => Ok(false),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(self.invalid_type(field, "a boolean")),
            },
            Some(_) => Err(self.invalid_type(field, "a boolean")),
        }
    }

    /// A JSON object if present.
    pub(crate) fn optional_object(
        &self,
        field: &'static str,
    ) -> Result<Option<Map<String, Value>>, ValidationError> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(self.invalid_type(field, "an object")),
        }
    }

    /// An object whose values are scalars, rendered as strings.
    pub(crate) fn string_map(&self, field: &'static str) -> Result<BTreeMap<String, String>, ValidationError> {
        let Some(map) = self.optional_object(field)? else {
            return Ok(BTreeMap::new());
        };

        map.into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                Value::Number(n) => Ok((key, n.to_string())),
                Value::Bool(b) => Ok((key, b.to_string())),
                _ => Err(self.invalid_type(field, "an object of scalar values")),
            })
            .collect()
    }

    /// An absolute `http`/`https` URL.
    pub(crate) fn required_url(&self, field: &'static str) -> Result<String, ValidationError> {
        let raw = self.required_str(field)?;
        let bad = || ValidationError::InvalidUrl {
            action: self.kind,
            field,
            value: raw.clone(),
        };

        let parsed = Url::parse(raw.trim()).map_err(|_| bad())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(bad());
        }
        Ok(raw.trim().to_owned())
    }

    /// A SQL identifier, optionally schema-qualified.
    pub(crate) fn required_identifier(&self, field: &'static str) -> Result<String, ValidationError> {
        let raw = self.required_str(field)?;
        if IDENTIFIER_RE.is_match(raw.trim()) {
            Ok(raw.trim().to_owned())
        } else {
            Err(self.invalid(field, format!("must be a plain identifier, got '{raw}'")))
        }
    }

    /// A string that looks like an e-mail address.
    pub(crate) fn required_email(&self, field: &'static str) -> Result<String, ValidationError> {
        let raw = self.required_str(field)?;
        let trimmed = raw.trim();
        let looks_valid = match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !trimmed.contains(char::is_whitespace)
            }
            None => false,
        };

        if looks_valid {
            Ok(trimmed.to_owned())
        } else {
            Err(self.invalid(field, format!("must be an e-mail address, got '{raw}'")))
        }
    }
}
