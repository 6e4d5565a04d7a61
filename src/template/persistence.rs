//! Durable storage for the template pattern.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, warn};

use super::pattern::Template;
use crate::error::TemplateError;

/// Storage seam for the template: loaded once at startup, saved on every update.
#[async_trait]
pub trait TemplatePersistence: Send + Sync {
    /// Load the stored pattern. `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<String>, TemplateError>;

    /// Persist a new pattern, replacing the previous one.
    async fn save(&self, pattern: &str) -> Result<(), TemplateError>;
}

/// Load the stored template, falling back to identity on any failure.
pub async fn load_or_default(persistence: &dyn TemplatePersistence) -> Template {
    match persistence.load().await {
        Ok(Some(pattern)) => {
            let template = Template::new(pattern);
            if let Err(e) = template.validate() {
                warn!(
                    pattern = %template.pattern(),
                    error = %e,
                    "Stored template cannot render; sends will fail until it is replaced"
                );
            } else {
                info!(pattern = %template.pattern(), "Loaded template");
            }
            template
        }
        Ok(None) => {
            info!("No stored template, using identity");
            Template::identity()
        }
        Err(e) => {
            warn!(error = %e, "Failed to load template, using identity");
            Template::identity()
        }
    }
}

/// Template stored as a single JSON string in a file.
pub struct JsonTemplateFile {
    path: PathBuf,
}

impl JsonTemplateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TemplatePersistence for JsonTemplateFile {
    async fn load(&self) -> Result<Option<String>, TemplateError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let pattern: String = serde_json::from_str(&raw)?;
        Ok(Some(pattern))
    }

    async fn save(&self, pattern: &str) -> Result<(), TemplateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let encoded = serde_json::to_string(pattern)?;
        fs::write(&self.path, encoded)
            .await
            .map_err(|e| TemplateError::Persistence(format!("{}: {e}", self.path.display())))
    }
}
