//! The template engine.
//!
//! Substitution runs in three passes over the *original* template text:
//! 1. `[field]` variables, expanded from the data map;
//! 2. `{{resId:N}}` resources;
//! 3. `$_NAME_$` settings.
//!
//! Text produced by pass 1 is never scanned by passes 2 and 3, so a user
//! supplied field value cannot smuggle in resource or setting tokens.
//! Resource bodies are administrator content and are scanned for settings.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::dates;
use crate::loaders::{EmptyLoader, ResourceLoader, SettingsLoader};
use crate::transform::{TransformContext, Transformer, TransformerRegistry};

/// Default format applied to date-like fields (`1st March 2024`).
pub const DEFAULT_DATE_FORMAT: &str = "jS F Y";

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z0-9_.\-]+)(?:::([A-Za-z0-9_]+)(?:\|\|([^\]]*))?)?\]").unwrap()
});

static SOLE_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([A-Za-z0-9_.\-]+)\]$").unwrap());

static RESOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{resId:(\d+)\}\}").unwrap());

static SETTING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$_([A-Za-z0-9_]+?)_\$").unwrap());

/// Field names treated as dates.
static DATE_FIELD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^date$",
        r"^created_at$",
        r"^updated_at$",
        r"^dob$",
        r"^date_of_birth$",
        r"_date$",
        r"_at$",
        r"_on$",
        r"^date_",
        r"_year$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// A piece of output text. Only trusted pieces are scanned by later passes.
struct Segment {
    text: String,
    trusted: bool,
}

/// Stateless, shareable template processor.
#[derive(Clone)]
pub struct TemplateEngine {
    resources: Arc<dyn ResourceLoader>,
    settings: Arc<dyn SettingsLoader>,
    transformers: TransformerRegistry,
    default_date_format: String,
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("transformers", &self.transformers)
            .field("default_date_format", &self.default_date_format)
            .finish_non_exhaustive()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Engine with built-in transformers and empty resource/settings loaders.
    pub fn new() -> Self {
        Self {
            resources: Arc::new(EmptyLoader),
            settings: Arc::new(EmptyLoader),
            transformers: TransformerRegistry::with_builtins(),
            default_date_format: DEFAULT_DATE_FORMAT.to_owned(),
        }
    }

    pub fn with_resources(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.resources = Arc::new(loader);
        self
    }

    pub fn with_shared_resources(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.resources = loader;
        self
    }

    pub fn with_settings(mut self, loader: impl SettingsLoader + 'static) -> Self {
        self.settings = Arc::new(loader);
        self
    }

    pub fn with_shared_settings(mut self, loader: Arc<dyn SettingsLoader>) -> Self {
        self.settings = loader;
        self
    }

    pub fn with_default_date_format(mut self, format: impl Into<String>) -> Self {
        self.default_date_format = format.into();
        self
    }

    /// Register a custom transformer alongside the built-ins.
    pub fn with_transformer(
        mut self,
        name: impl Into<String>,
        transformer: impl Transformer + 'static,
    ) -> Self {
        self.transformers.register(name, transformer);
        self
    }

    pub fn default_date_format(&self) -> &str {
        &self.default_date_format
    }

    /// Substitute every token in `template` using `data`.
    pub fn process(&self, template: &str, data: &Map<String, Value>) -> String {
        let mut segments = self.expand_variables(template, data);

        for segment in segments.iter_mut().filter(|s| s.trusted) {
            let with_resources = RESOURCE_RE.replace_all(&segment.text, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<u64>()
                    .map(|id| self.resources.load(id))
                    .unwrap_or_default()
            });
            let with_settings = SETTING_RE
                .replace_all(&with_resources, |caps: &Captures<'_>| {
                    self.settings.setting(&caps[1])
                })
                .into_owned();
            segment.text = with_settings;
        }

        segments.into_iter().map(|s| s.text).collect()
    }

    fn expand_variables(&self, template: &str, data: &Map<String, Value>) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in VARIABLE_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            segments.push(Segment {
                text: template[last..whole.start()].to_owned(),
                trusted: true,
            });
            segments.push(Segment {
                text: self.expand_variable(
                    &caps[1],
                    caps.get(2).map(|m| m.as_str()),
                    caps.get(3).map(|m| m.as_str()),
                    data,
                ),
                trusted: false,
            });
            last = whole.end();
        }

        segments.push(Segment {
            text: template[last..].to_owned(),
            trusted: true,
        });
        segments
    }

    fn expand_variable(
        &self,
        name: &str,
        transformer: Option<&str>,
        params: Option<&str>,
        data: &Map<String, Value>,
    ) -> String {
        let Some(value) = lookup(data, name) else {
            return String::new();
        };
        let raw = value_text(value);
        let ctx = TransformContext {
            params,
            default_date_format: &self.default_date_format,
        };

        match transformer {
            Some(t) if TransformerRegistry::is_date_transformer(t) => {
                self.transformers.apply(t, &raw, &ctx)
            }
            Some(t) => {
                let base = self.date_formatted(name, raw);
                self.transformers.apply(t, &base, &ctx)
            }
            None => self.date_formatted(name, raw),
        }
    }

    fn date_formatted(&self, name: &str, raw: String) -> String {
        if is_date_field(name) {
            dates::reformat(&raw, &self.default_date_format)
        } else {
            raw
        }
    }
}

/// Whether `name` (or the last segment of a dotted path) looks like a date field.
pub fn is_date_field(name: &str) -> bool {
    let leaf = name.rsplit('.').next().unwrap_or(name);
    DATE_FIELD_RES.iter().any(|re| re.is_match(leaf))
}

/// The field named by `text` when it is exactly one `[field]` token with no
/// transformer.
pub fn sole_field(text: &str) -> Option<&str> {
    SOLE_FIELD_RE.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Resolve `name` as a literal key first, then as a dotted path.
pub fn lookup<'a>(data: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    if let Some(value) = data.get(name) {
        return Some(value);
    }
    if !name.contains('.') {
        return None;
    }

    let mut parts = name.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a JSON value as template text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("test data is an object")
    }

    #[test]
    fn text_without_tokens_is_unchanged() {
        let engine = TemplateEngine::new();
        let text = "Dear applicant, your file is complete.";
        assert_eq!(engine.process(text, &data(json!({ "a": 1 }))), text);
    }

    #[test]
    fn variables_are_substituted_and_missing_ones_are_empty() {
        let engine = TemplateEngine::new();
        let out = engine.process(
            "Hello [first_name] [last_name], ref [ref]!",
            &data(json!({ "first_name": "Ada", "ref": 42 })),
        );
        assert_eq!(out, "Hello Ada , ref 42!");
    }

    #[test]
    fn date_fields_use_the_default_format() {
        let engine = TemplateEngine::new();
        let d = data(json!({
            "expiry_date": "2025-06-01",
            "created_at": "2024-03-02 09:30:00",
            "dob": "garbage",
            "notes": "2024-01-01",
        }));
        assert_eq!(engine.process("[expiry_date]", &d), "1st June 2025");
        assert_eq!(engine.process("[created_at]", &d), "2nd March 2024");
        assert_eq!(engine.process("[dob]", &d), "garbage");
        assert_eq!(engine.process("[notes]", &d), "2024-01-01");
    }

    #[test]
    fn default_date_format_is_configurable() {
        let engine = TemplateEngine::new().with_default_date_format("d/m/Y");
        let d = data(json!({ "renewal_date": "2025-06-01" }));
        assert_eq!(engine.process("[renewal_date]", &d), "01/06/2025");
    }

    #[test]
    fn transformers_apply_with_params() {
        let engine = TemplateEngine::new();
        let d = data(json!({ "issued_on": "2024-01-15", "name": "Ada" }));
        assert_eq!(
            engine.process("[issued_on::date_add||1 year]", &d),
            "15th January 2025"
        );
        assert_eq!(
            engine.process("[issued_on::date_transform||Y]", &d),
            "2024"
        );
        assert_eq!(engine.process("[name::uppercase]", &d), "ADA");
        assert_eq!(engine.process("[issued_on::uppercase]", &d), "15TH JANUARY 2024");
        assert_eq!(engine.process("[name::nonexistent]", &d), "Ada");
    }

    #[test]
    fn custom_transformer_is_used() {
        let engine = TemplateEngine::new().with_transformer(
            "initials",
            |value: &str, _: &TransformContext<'_>| {
                value
                    .split_whitespace()
                    .filter_map(|w| w.chars().next())
                    .collect::<String>()
            },
        );
        let d = data(json!({ "full_name": "Ada King Lovelace" }));
        assert_eq!(engine.process("[full_name::initials]", &d), "AKL");
    }

    #[test]
    fn resources_and_settings_resolve_through_loaders() {
        let mut resources = HashMap::new();
        resources.insert(7u64, "Signed, $_BOARD_NAME_$".to_string());
        let engine = TemplateEngine::new()
            .with_resources(resources)
            .with_settings(|key: &str| match key {
                "BOARD_NAME" => "Medical Board".to_string(),
                _ => String::new(),
            });

        let out = engine.process("Hi [name]. {{resId:7}} ($_BOARD_NAME_$)", &data(json!({ "name": "Ada" })));
        assert_eq!(out, "Hi Ada. Signed, Medical Board (Medical Board)");
    }

    #[test]
    fn loaders_default_to_empty() {
        let engine = TemplateEngine::new();
        assert_eq!(engine.process("a{{resId:1}}b$_X_$c", &Map::new()), "abc");
    }

    #[test]
    fn field_values_are_not_rescanned_for_tokens() {
        let engine = TemplateEngine::new()
            .with_resources(|_id: u64| "SECRET RESOURCE".to_string())
            .with_settings(|_key: &str| "SECRET SETTING".to_string());
        let d = data(json!({ "comment": "{{resId:1}} $_DB_PASSWORD_$" }));
        assert_eq!(
            engine.process("Comment: [comment]", &d),
            "Comment: {{resId:1}} $_DB_PASSWORD_$"
        );
    }

    #[test]
    fn dotted_paths_and_value_rendering() {
        let engine = TemplateEngine::new();
        let d = data(json!({
            "address": { "city": "Lagos" },
            "tags": ["a", "b"],
            "paid": true,
            "none": null,
        }));
        assert_eq!(
            engine.process("[address.city]|[tags]|[paid]|[none]|[address.zip]", &d),
            "Lagos|a, b|true||"
        );
    }

    #[test]
    fn sole_field_only_accepts_a_bare_token() {
        assert_eq!(sole_field("[expiry_date]"), Some("expiry_date"));
        assert_eq!(sole_field("[address.city]"), Some("address.city"));
        assert_eq!(sole_field("[issued_on::date_add||1 year]"), None);
        assert_eq!(sole_field("ref [id]"), None);
        assert_eq!(sole_field("[a] [b]"), None);

        let d = data(json!({ "address": { "city": "Lagos" }, "a.b": 1 }));
        assert_eq!(lookup(&d, "address.city"), Some(&json!("Lagos")));
        assert_eq!(lookup(&d, "a.b"), Some(&json!(1)));
    }
}
