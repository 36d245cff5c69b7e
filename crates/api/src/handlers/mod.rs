//! Route handlers, one module per resource.

pub mod actions;
pub mod applications;
pub mod criteria;
pub mod settings;
pub mod templates;
pub mod transitions;
