//! Tool registry — the fixed catalogue of expense tools.
//!
//! Maps each tool name to its definition (name, description, JSON schema)
//! and a typed executor. The catalogue is built once at startup and shared
//! read-only by every run. Adding a tool means one `register` call here.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::inference::ToolDefinition;
use crate::store::{DateRange, ExpenseStore};

use super::errors::ToolError;
use super::types::ToolArguments;

/// Argument field carrying the caller identity. Always set by the dispatcher.
pub const IDENTITY_FIELD: &str = "userId";

/// Date format accepted in tool arguments.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A tool executor: runs against the store with already-augmented arguments.
pub type ToolExecutor = fn(&dyn ExpenseStore, &ToolArguments) -> Result<Value, ToolError>;

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Name-keyed catalogue of tools.
///
/// Definitions keep registration order so the catalogue sent to the model is
/// stable from run to run.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    executors: HashMap<String, ToolExecutor>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The five expense tools.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            ToolDefinition::function(
                "get_user_expenses",
                "List the user's expenses, newest first. Optionally restrict to a date range.",
                schema(
                    "The user whose expenses to list",
                    json!({
                        "startDate": {
                            "type": "string",
                            "description": "Only include expenses on or after this date (YYYY-MM-DD)"
                        },
                        "endDate": {
                            "type": "string",
                            "description": "Only include expenses on or before this date (YYYY-MM-DD)"
                        }
                    }),
                ),
            ),
            get_user_expenses,
        );
        registry.register(
            ToolDefinition::function(
                "get_expenses_with_categories",
                "List the user's expenses together with the name of each expense's category.",
                schema("The user whose expenses to list", json!({})),
            ),
            get_expenses_with_categories,
        );
        registry.register(
            ToolDefinition::function(
                "get_expense_summary",
                "Total spending per category for the user.",
                schema("The user to summarize", json!({})),
            ),
            get_expense_summary,
        );
        registry.register(
            ToolDefinition::function(
                "get_total_expenses",
                "Sum of all of the user's expenses.",
                schema("The user to total", json!({})),
            ),
            get_total_expenses,
        );
        registry.register(
            ToolDefinition::function(
                "get_user_categories",
                "List the user's expense categories.",
                schema("The user whose categories to list", json!({})),
            ),
            get_user_categories,
        );
        registry
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, definition: ToolDefinition, executor: ToolExecutor) {
        let name = definition.function.name.clone();
        match self
            .definitions
            .iter_mut()
            .find(|d| d.function.name == name)
        {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
        self.executors.insert(name, executor);
    }

    /// Look up an executor by tool name.
    pub fn executor(&self, name: &str) -> Result<ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .copied()
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// The full catalogue, in registration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Return all registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .map(|d| d.function.name.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Build an object schema with the identity property plus `extra` properties.
///
/// The identity is listed but not required: the dispatcher always supplies
/// it, so the model does not have to.
fn schema(identity_description: &str, extra: Value) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        IDENTITY_FIELD.to_string(),
        json!({ "type": "string", "description": identity_description }),
    );
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": []
    })
}

// ─── Argument helpers ───────────────────────────────────────────────────────

/// The caller identity. Present on every dispatched call.
fn identity(args: &ToolArguments) -> Result<&str, ToolError> {
    args.get(IDENTITY_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            reason: format!("missing '{IDENTITY_FIELD}'"),
        })
}

/// An optional `YYYY-MM-DD` argument. `null` and `""` count as absent.
fn optional_date(args: &ToolArguments, field: &str) -> Result<Option<NaiveDate>, ToolError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|_| ToolError::InvalidArguments {
                reason: format!("'{field}' must be a date in YYYY-MM-DD format, got '{s}'"),
            }),
        Some(other) => Err(ToolError::InvalidArguments {
            reason: format!("'{field}' must be a string, got {other}"),
        }),
    }
}

// ─── Executors ──────────────────────────────────────────────────────────────

fn get_user_expenses(store: &dyn ExpenseStore, args: &ToolArguments) -> Result<Value, ToolError> {
    let user_id = identity(args)?;
    let range = DateRange {
        start: optional_date(args, "startDate")?,
        end: optional_date(args, "endDate")?,
    };
    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(ToolError::InvalidArguments {
                reason: format!("startDate {start} is after endDate {end}"),
            });
        }
    }
    Ok(serde_json::to_value(store.list_expenses(user_id, range)?)?)
}

fn get_expenses_with_categories(
    store: &dyn ExpenseStore,
    args: &ToolArguments,
) -> Result<Value, ToolError> {
    let user_id = identity(args)?;
    Ok(serde_json::to_value(
        store.list_expenses_with_categories(user_id)?,
    )?)
}

fn get_expense_summary(store: &dyn ExpenseStore, args: &ToolArguments) -> Result<Value, ToolError> {
    let user_id = identity(args)?;
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in store.expense_amounts_by_category(user_id)? {
        let name = row
            .category_name
            .unwrap_or_else(|| "Uncategorized".to_string());
        *totals.entry(name).or_insert(0.0) += row.amount;
    }
    Ok(serde_json::to_value(totals)?)
}

fn get_total_expenses(store: &dyn ExpenseStore, args: &ToolArguments) -> Result<Value, ToolError> {
    let user_id = identity(args)?;
    let total = store.total_expenses(user_id)?;
    Ok(json!({ "total": total, "currency": "USD" }))
}

fn get_user_categories(store: &dyn ExpenseStore, args: &ToolArguments) -> Result<Value, ToolError> {
    let user_id = identity(args)?;
    Ok(serde_json::to_value(store.list_categories(user_id)?)?)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
