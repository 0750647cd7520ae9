//! Definition page assembly
//!
//! Raw definition HTML is wrapped with, in order: a reset style, the shared
//! injection script, the dictionary's own fragment, and a title script.
//! Later pieces can override earlier ones.

use std::sync::Arc;

/// Script shared by every dictionary page
pub const SHARED_INJECTION: &str = include_str!("../assets/injection.js");

const RESET_STYLE: &str = "<style>\n  html, body {\n    padding: 0;\n    margin: 0;\n  }\n</style>\n";

/// Wraps definitions of one dictionary into full pages
#[derive(Debug, Clone)]
pub struct PageAssembler {
    shared_script: Arc<str>,
    custom_fragment: Option<String>,
    title: String,
}

impl PageAssembler {
    pub fn new(shared_script: Arc<str>, custom_fragment: Option<String>, title: impl Into<String>) -> Self {
        Self {
            shared_script,
            custom_fragment,
            title: title.into(),
        }
    }

    pub fn assemble(&self, definition: &str) -> String {
        let custom = self.custom_fragment.as_deref().unwrap_or("");
        let mut page = String::with_capacity(
            RESET_STYLE.len() + definition.len() + self.shared_script.len() + custom.len() + 128,
        );

        page.push_str(RESET_STYLE);
        page.push_str(definition);
        page.push_str("\n<script>\n");
        page.push_str(&script_safe(&self.shared_script));
        page.push_str("\n</script>\n");
        if !custom.is_empty() {
            page.push_str(custom);
            page.push('\n');
        }
        page.push_str("<script>document.title = ");
        page.push_str(&js_string(&self.title));
        page.push_str(";</script>\n");
        page
    }
}

/// JSON string literal that cannot close the surrounding script element
fn js_string(value: &str) -> String {
    let quoted = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
    script_safe(&quoted)
}

fn script_safe(source: &str) -> String {
    source.replace("</", "<\\/")
}
