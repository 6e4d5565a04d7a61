//! `/pattern` command — operator-only template replacement.

use std::sync::Arc;

use tracing::{debug, info};

use super::pattern::Template;
use super::persistence::TemplatePersistence;
use super::store::TemplateStore;
use crate::error::TemplateError;

/// Command name the handler answers to.
pub const COMMAND: &str = "pattern";

/// Text rendered into the confirmation preview.
pub const PREVIEW_SAMPLE: &str = "Sample post text";

/// Replaces the shared template on behalf of the operator.
pub struct TemplateUpdateHandler {
    admin_id: i64,
    store: Arc<TemplateStore>,
    persistence: Arc<dyn TemplatePersistence>,
}

impl TemplateUpdateHandler {
    pub fn new(
        admin_id: i64,
        store: Arc<TemplateStore>,
        persistence: Arc<dyn TemplatePersistence>,
    ) -> Self {
        Self {
            admin_id,
            store,
            persistence,
        }
    }

    pub fn is_operator(&self, sender_id: Option<i64>) -> bool {
        sender_id == Some(self.admin_id)
    }

    /// Apply `/pattern <args>` from `sender_id`.
    ///
    /// Returns `Ok(None)` for anyone but the operator, otherwise the HTML
    /// confirmation to send back. Invalid patterns are rejected before
    /// anything is saved.
    pub async fn handle(
        &self,
        sender_id: Option<i64>,
        args: &str,
    ) -> Result<Option<String>, TemplateError> {
        if !self.is_operator(sender_id) {
            debug!(sender = ?sender_id, "Ignoring /{COMMAND} from non-operator");
            return Ok(None);
        }

        let template = Template::new(unescape_newlines(args));
        let preview = template.render(PREVIEW_SAMPLE)?;

        self.persistence.save(template.pattern()).await?;
        let current = template.pattern().to_string();
        let previous = self.store.set(template).await;

        info!(previous = %previous.pattern(), %current, "Template updated");

        Ok(Some(confirmation(&preview)))
    }
}

/// Turn literal `\n` sequences typed in the chat into real newlines.
pub fn unescape_newlines(args: &str) -> String {
    args.replace("\\n", "\n")
}

fn confirmation(preview: &str) -> String {
    format!(
        "Template updated:\n\n<code>{}</code>",
        escape_html(preview)
    )
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
