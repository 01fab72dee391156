//! Expense Store — the data-access collaborator behind the tools.
//!
//! Submodules:
//! - `database`: SQLite implementation (users, categories, expenses, saved queries)
//! - `types`: Record types returned to the tools
//! - `errors`: Store-level error types
//!
//! The agent core only sees the two narrow traits below. Every operation is
//! scoped by the caller's user id; none of the tool-facing operations write.

pub mod database;
pub mod errors;
pub mod types;

pub use database::ExpenseDatabase;
pub use errors::StoreError;
pub use types::{
    AiQuery, Category, CategoryAmount, CategoryRef, DateRange, Expense, ExpenseWithCategory,
    NewAiQuery, NewExpense, User,
};

/// Read-only expense queries consumed by the tool executors.
pub trait ExpenseStore: Send + Sync {
    /// Expenses for a user, newest date first, within `range`.
    fn list_expenses(&self, user_id: &str, range: DateRange) -> Result<Vec<Expense>, StoreError>;

    /// Expenses for a user with their category joined in.
    fn list_expenses_with_categories(
        &self,
        user_id: &str,
    ) -> Result<Vec<ExpenseWithCategory>, StoreError>;

    /// One row per expense: its amount and category name (if any).
    fn expense_amounts_by_category(&self, user_id: &str) -> Result<Vec<CategoryAmount>, StoreError>;

    /// Sum of all expense amounts for a user. `0.0` when there are none.
    fn total_expenses(&self, user_id: &str) -> Result<f64, StoreError>;

    /// Categories for a user, by name ascending.
    fn list_categories(&self, user_id: &str) -> Result<Vec<Category>, StoreError>;
}

/// User bookkeeping and the saved question/answer log.
///
/// Used around a run, never inside one: `ensure_user` before, `save_query`
/// after. Both are best-effort from the caller's point of view.
pub trait QueryLog: Send + Sync {
    /// Get the user, creating a bare record if it does not exist.
    fn ensure_user(&self, user_id: &str) -> Result<User, StoreError>;

    fn save_query(&self, query: &NewAiQuery) -> Result<AiQuery, StoreError>;

    /// Most recent saved queries first.
    fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<AiQuery>, StoreError>;

    /// Case-insensitive substring search over question and answer text.
    fn search_queries(&self, user_id: &str, text: &str) -> Result<Vec<AiQuery>, StoreError>;

    /// Delete one of the user's saved queries. Returns whether a row was removed.
    fn delete_query(&self, user_id: &str, query_id: &str) -> Result<bool, StoreError>;
}
