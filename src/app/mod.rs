//! The application behind the protocol: an in-memory item list and the widget
//! that renders it.
//!
//! # Modules
//!
//! - [`store`]: Process-wide item store
//! - [`tools`]: `get_items` and `add_item`
//! - [`widget`]: Widget HTML asset served as a resource

pub mod store;
pub mod tools;
pub mod widget;

pub use store::{Item, ItemStore, StoreError};
pub use tools::{ItemTool, ToolError};
pub use widget::{WidgetAsset, WidgetSource, WIDGET_MIME_TYPE, WIDGET_URI};

use crate::mcp::registry::{RegistryError, ToolRegistry};

/// Builds the registry holding both item tools and the widget resource.
///
/// # Errors
///
/// Returns an error if a name or URI is registered twice.
pub fn build_registry(widget: &WidgetAsset) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register_resource(widget.resource_descriptor())?;
    registry.register(ItemTool::GetItems.descriptor())?;
    registry.register(ItemTool::AddItem.descriptor())?;
    Ok(registry)
}
