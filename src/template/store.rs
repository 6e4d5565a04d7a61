//! Shared holder for the active template.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::pattern::Template;

/// Process-wide template, injected into the delivery pipeline and the
/// update handler. Readers get a snapshot; the writer swaps the whole value.
#[derive(Debug, Default)]
pub struct TemplateStore {
    current: RwLock<Arc<Template>>,
}

impl TemplateStore {
    pub fn new(template: Template) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(template)),
        })
    }

    /// Snapshot of the current template.
    pub async fn get(&self) -> Arc<Template> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the template. Returns the previous one.
    pub async fn set(&self, template: Template) -> Arc<Template> {
        let mut current = self.current.write().await;
        std::mem::replace(&mut *current, Arc::new(template))
    }
}
