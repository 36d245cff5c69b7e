//! Resolver seams for `{{resId:N}}` and `$_SETTING_$` tokens.
//!
//! Loaders are infallible: a loader that cannot find a value returns its own
//! fallback (usually the empty string). Closures implement both traits, so
//! `TemplateEngine::new().with_resources(|id| ...)` works without a wrapper.

use std::collections::HashMap;

/// Resolves reusable content blocks by numeric id.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, id: u64) -> String;
}

/// Resolves named application settings.
pub trait SettingsLoader: Send + Sync {
    fn setting(&self, key: &str) -> String;
}

impl<F> ResourceLoader for F
where
    F: Fn(u64) -> String + Send + Sync,
{
    fn load(&self, id: u64) -> String {
        self(id)
    }
}

impl<F> SettingsLoader for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn setting(&self, key: &str) -> String {
        self(key)
    }
}

impl ResourceLoader for HashMap<u64, String> {
    fn load(&self, id: u64) -> String {
        self.get(&id).cloned().unwrap_or_default()
    }
}

impl SettingsLoader for HashMap<String, String> {
    fn setting(&self, key: &str) -> String {
        self.get(key).cloned().unwrap_or_default()
    }
}

/// Default loader: every lookup resolves to the empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyLoader;

impl ResourceLoader for EmptyLoader {
    fn load(&self, _id: u64) -> String {
        String::new()
    }
}

impl SettingsLoader for EmptyLoader {
    fn setting(&self, _key: &str) -> String {
        String::new()
    }
}
