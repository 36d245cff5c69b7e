//! `templating` crate — token substitution for notification bodies,
//! subjects, filenames and generated documents.
//!
//! Supported tokens:
//! - `[field]`, `[field::transformer]`, `[field::transformer||params]`
//! - `{{resId:<int>}}`, resolved through a [`ResourceLoader`]
//! - `$_SETTING_NAME_$`, resolved through a [`SettingsLoader`]
//!
//! Processing never fails: missing fields, unknown transformers and
//! malformed dates all degrade to a best-effort string.

pub mod dates;
pub mod engine;
pub mod loaders;
pub mod transform;

pub use engine::{TemplateEngine, DEFAULT_DATE_FORMAT};
pub use loaders::{EmptyLoader, ResourceLoader, SettingsLoader};
pub use transform::{TransformContext, Transformer, TransformerRegistry};
