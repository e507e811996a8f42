//! The companion widget rendered by the agent host.
//!
//! The HTML is read once at startup and served unchanged for the lifetime of
//! the process. Picking up a rebuilt widget requires a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::error::ConfigError;
use crate::mcp::registry::{ResourceDescriptor, ResourceProvider};

/// URI the tools reference as their output template.
pub const WIDGET_URI: &str = "ui://widget/main.html";

/// Resource name of the widget.
pub const WIDGET_NAME: &str = "my-widget";

/// MIME type the host expects for widget documents.
pub const WIDGET_MIME_TYPE: &str = "text/html+skybridge";

const BUILTIN_WIDGET: &str = include_str!("../../assets/widget.html");

/// Where the widget HTML was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetSource {
    /// Compiled into the binary.
    Builtin,
    /// Read from a file at startup.
    File(PathBuf),
}

/// The widget document.
#[derive(Debug, Clone)]
pub struct WidgetAsset {
    html: Arc<str>,
    source: WidgetSource,
}

impl WidgetAsset {
    /// The widget compiled into the binary.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            html: Arc::from(BUILTIN_WIDGET),
            source: WidgetSource::Builtin,
        }
    }

    /// Reads the widget from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is empty.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let html = std::fs::read_to_string(path).map_err(|e| ConfigError::WidgetRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        if html.trim().is_empty() {
            return Err(ConfigError::WidgetEmpty {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            html: Arc::from(html),
            source: WidgetSource::File(path.to_path_buf()),
        })
    }

    /// Loads the configured widget, or the built-in one when none is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured file cannot be used.
    pub fn from_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::builtin()), Self::load)
    }

    /// The HTML document.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Where the document came from.
    #[must_use]
    pub const fn source(&self) -> &WidgetSource {
        &self.source
    }

    /// Describes the widget as a registry resource.
    #[must_use]
    pub fn resource_descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: WIDGET_URI.to_string(),
            name: WIDGET_NAME.to_string(),
            description: Some("Interactive item list".to_string()),
            mime_type: WIDGET_MIME_TYPE.to_string(),
            meta: Some(json!({ "openai/widgetPrefersBorder": true })),
            provider: ResourceProvider::Text(Arc::clone(&self.html)),
        }
    }
}
