//! Named value transformers for `[field::name||params]` tokens.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dates;

/// Per-call inputs handed to a transformer besides the value itself.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Text after `||`, if any.
    pub params: Option<&'a str>,
    /// The engine's configured default date format.
    pub default_date_format: &'a str,
}

impl TransformContext<'_> {
    fn params_or<'p>(&'p self, fallback: &'p str) -> &'p str {
        match self.params.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => fallback,
        }
    }
}

/// A value transformer. Implemented for closures.
pub trait Transformer: Send + Sync {
    fn apply(&self, value: &str, ctx: &TransformContext<'_>) -> String;
}

impl<F> Transformer for F
where
    F: Fn(&str, &TransformContext<'_>) -> String + Send + Sync,
{
    fn apply(&self, value: &str, ctx: &TransformContext<'_>) -> String {
        self(value, ctx)
    }
}

pub const DATE_ADD: &str = "date_add";
pub const DATE_TRANSFORM: &str = "date_transform";

/// Registry of transformers keyed by token name.
#[derive(Clone)]
pub struct TransformerRegistry {
    entries: HashMap<String, Arc<dyn Transformer>>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TransformerRegistry").field("names", &names).finish()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TransformerRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// `date_add`, `date_transform`, `uppercase`, `lowercase`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(DATE_ADD, date_add);
        registry.register(DATE_TRANSFORM, date_transform);
        registry.register("uppercase", |value: &str, _: &TransformContext<'_>| {
            value.to_uppercase()
        });
        registry.register("lowercase", |value: &str, _: &TransformContext<'_>| {
            value.to_lowercase()
        });
        registry
    }

    /// Register (or replace) a transformer.
    pub fn register(&mut self, name: impl Into<String>, transformer: impl Transformer + 'static) {
        self.entries.insert(name.into(), Arc::new(transformer));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Date transformers receive the raw field value and do their own
    /// formatting; every other transformer sees the already-formatted value.
    pub fn is_date_transformer(name: &str) -> bool {
        name == DATE_ADD || name == DATE_TRANSFORM
    }

    /// Apply `name` to `value`. Unknown names return the value unchanged.
    pub fn apply(&self, name: &str, value: &str, ctx: &TransformContext<'_>) -> String {
        match self.entries.get(name) {
            Some(transformer) => transformer.apply(value, ctx),
            None => {
                tracing::debug!("unknown transformer '{}', passing value through", name);
                value.to_owned()
            }
        }
    }
}

/// `[field::date_transform||d/m/Y]`
fn date_transform(value: &str, ctx: &TransformContext<'_>) -> String {
    dates::reformat(value, ctx.params_or(ctx.default_date_format))
}

/// `[field::date_add||1 year]` or `[field::date_add||30 days|Y-m-d]`
fn date_add(value: &str, ctx: &TransformContext<'_>) -> String {
    let params = ctx.params_or("");
    let (interval, format) = match params.split_once('|') {
        Some((interval, format)) if !format.trim().is_empty() => (interval, format.trim()),
        Some((interval, _)) => (interval, ctx.default_date_format),
        None => (params, ctx.default_date_format),
    };

    dates::parse_date(value)
        .and_then(|dt| dates::add_interval(dt, interval))
        .map(|dt| dates::format_php(&dt, format))
        .unwrap_or_else(|| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(params: Option<&str>) -> TransformContext<'_> {
        TransformContext {
            params,
            default_date_format: "jS F Y",
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TransformerRegistry::with_builtins();
        for name in ["date_add", "date_transform", "uppercase", "lowercase"] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
        assert_eq!(registry.apply("uppercase", "Dr. Ada", &ctx(None)), "DR. ADA");
        assert_eq!(registry.apply("lowercase", "Dr. Ada", &ctx(None)), "dr. ada");
    }

    #[test]
    fn date_add_uses_default_or_explicit_format() {
        let registry = TransformerRegistry::with_builtins();
        assert_eq!(
            registry.apply("date_add", "2024-01-15", &ctx(Some("1 year"))),
            "15th January 2025"
        );
        assert_eq!(
            registry.apply("date_add", "2024-01-15", &ctx(Some("30 days|Y-m-d"))),
            "2024-02-14"
        );
        assert_eq!(
            registry.apply("date_add", "whenever", &ctx(Some("1 year"))),
            "whenever"
        );
    }

    #[test]
    fn date_transform_reformats() {
        let registry = TransformerRegistry::with_builtins();
        assert_eq!(
            registry.apply("date_transform", "2024-01-15", &ctx(Some("d/m/Y"))),
            "15/01/2024"
        );
        assert_eq!(
            registry.apply("date_transform", "2024-01-15", &ctx(None)),
            "15th January 2024"
        );
    }

    #[test]
    fn unknown_transformer_is_a_passthrough() {
        let registry = TransformerRegistry::with_builtins();
        assert_eq!(registry.apply("reverse", "abc", &ctx(None)), "abc");
    }

    #[test]
    fn custom_transformers_can_be_registered() {
        let mut registry = TransformerRegistry::empty();
        registry.register("money", |value: &str, ctx: &TransformContext<'_>| {
            format!("{}{}", ctx.params.unwrap_or("$"), value)
        });
        assert_eq!(registry.apply("money", "120", &ctx(Some("£"))), "£120");
        assert_eq!(registry.apply("money", "120", &ctx(None)), "$120");
    }
}
