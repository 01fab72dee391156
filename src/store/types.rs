//! Record types returned by the expense store.
//!
//! Field names serialize in snake_case, matching the column names the tools
//! have always exposed to the model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An account holder. Only the id is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

/// A user-defined expense category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: String,
}

/// A single expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub category_id: Option<String>,
    pub amount: f64,
    pub description: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub created_at: String,
}

/// The category fields joined onto an expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
}

/// An expense with its category, `categories: null` when uncategorized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseWithCategory {
    #[serde(flatten)]
    pub expense: Expense,
    pub categories: Option<CategoryRef>,
}

/// One expense amount tagged with its category name, input to the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAmount {
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub amount: f64,
}

/// A saved question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiQuery {
    pub id: String,
    pub user_id: String,
    pub query_text: Option<String>,
    pub ai_response: Option<String>,
    pub created_at: String,
}

/// Input for a new expense (no generated fields).
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: String,
    pub category_id: Option<String>,
    pub amount: f64,
    pub description: Option<String>,
    pub date: NaiveDate,
}

/// Input for a new saved query.
#[derive(Debug, Clone)]
pub struct NewAiQuery {
    pub user_id: String,
    pub query_text: Option<String>,
    pub ai_response: Option<String>,
}

/// Inclusive date bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// No bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Whether `date` falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}
