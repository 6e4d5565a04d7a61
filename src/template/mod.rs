//! Caption template: pattern, shared store, persistence and the operator command.

pub mod handler;
pub mod pattern;
pub mod persistence;
pub mod store;

pub use handler::TemplateUpdateHandler;
pub use pattern::Template;
pub use persistence::{JsonTemplateFile, TemplatePersistence};
pub use store::TemplateStore;
