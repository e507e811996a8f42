//! The item tools exposed to the agent host.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::app::store::{Item, ItemStore, StoreError};
use crate::app::widget::WIDGET_URI;
use crate::mcp::error::FieldError;
use crate::mcp::registry::{ToolDescriptor, ToolResult};
use crate::mcp::schema::{InputSchema, ParamSpec};

/// Errors a tool handler can return.
#[derive(Debug, Error)]
pub enum ToolError {
    /// An argument passed the schema but was rejected by the handler.
    #[error("{0}")]
    InvalidArgument(FieldError),

    /// Validated arguments could not be decoded into the handler's input type.
    #[error("failed to decode arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// The store refused the operation.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyName => {
                Self::InvalidArgument(FieldError::new("name", "Name must not be blank"))
            }
            other => Self::Store(other),
        }
    }
}

/// Every tool this server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTool {
    /// Returns the current items.
    GetItems,
    /// Appends an item by name.
    AddItem,
}

#[derive(Debug, Deserialize)]
struct AddItemArgs {
    name: String,
}

fn items_payload(items: &[Item]) -> Value {
    json!({ "items": items })
}

impl ItemTool {
    /// Runs the tool with arguments already checked against its schema.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] if the store rejects the operation.
    pub async fn run(self, args: Map<String, Value>, store: &ItemStore) -> Result<ToolResult, ToolError> {
        match self {
            Self::GetItems => {
                let items = store.list().await;
                Ok(ToolResult::text(
                    format!("{} items found.", items.len()),
                    items_payload(&items),
                ))
            }
            Self::AddItem => {
                let args: AddItemArgs = serde_json::from_value(Value::Object(args))?;
                let (item, items) = store.add(&args.name).await?;
                tracing::info!(item_id = %item.id, count = items.len(), "Item added");
                Ok(ToolResult::text(
                    format!("Added \"{}\".", item.name),
                    items_payload(&items),
                ))
            }
        }
    }

    /// Builds the registry descriptor for this tool.
    #[must_use]
    pub fn descriptor(self) -> ToolDescriptor {
        match self {
            Self::GetItems => ToolDescriptor {
                name: "get_items".to_string(),
                title: Some("Get items".to_string()),
                description: Some("Returns all items.".to_string()),
                input_schema: InputSchema::empty(),
                meta: Some(output_meta("Loading items…", "Items loaded.")),
                handler: self,
            },
            Self::AddItem => ToolDescriptor {
                name: "add_item".to_string(),
                title: Some("Add item".to_string()),
                description: Some("Adds an item by name.".to_string()),
                input_schema: InputSchema::empty()
                    .param(ParamSpec::non_empty_string("name").describe("Name of the item to add")),
                meta: Some(output_meta("Adding item…", "Item added.")),
                handler: self,
            },
        }
    }
}

/// Output annotations telling the host which widget renders the result.
fn output_meta(invoking: &str, invoked: &str) -> Value {
    json!({
        "openai/outputTemplate": WIDGET_URI,
        "openai/toolInvocation/invoking": invoking,
        "openai/toolInvocation/invoked": invoked,
    })
}
