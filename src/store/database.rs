//! SQLite database for users, categories, expenses, and saved queries.
//!
//! Uses `rusqlite` in synchronous mode behind a `Mutex`; the tool executors
//! call it from tokio's blocking pool. WAL mode is enabled for concurrent
//! readers from other processes.

use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::errors::StoreError;
use super::types::{
    AiQuery, Category, CategoryAmount, CategoryRef, DateRange, Expense, ExpenseWithCategory,
    NewAiQuery, NewExpense, User,
};
use super::{ExpenseStore, QueryLog};

/// Date format stored in the `expenses.date` column.
const DATE_FORMAT: &str = "%Y-%m-%d";

// ─── Database ───────────────────────────────────────────────────────────────

/// SQLite handle for the expense store.
pub struct ExpenseDatabase {
    conn: Mutex<Connection>,
}

impl ExpenseDatabase {
    /// Open (or create) the database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::LockPoisoned {
            reason: e.to_string(),
        })
    }

    // ─── Writes (seeding and the HTTP-facing CRUD layer) ────────────────

    /// Create a category for a user. The user row is created if missing.
    pub fn insert_category(&self, user_id: &str, name: &str) -> Result<Category, StoreError> {
        self.ensure_user(user_id)?;
        let category = Category {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            created_at: now(),
        };
        self.conn()?.execute(
            "INSERT INTO categories (id, user_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![category.id, category.user_id, category.name, category.created_at],
        )?;
        Ok(category)
    }

    /// Record an expense. The user row is created if missing.
    pub fn insert_expense(&self, new: &NewExpense) -> Result<Expense, StoreError> {
        self.ensure_user(&new.user_id)?;
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            category_id: new.category_id.clone(),
            amount: new.amount,
            description: new.description.clone(),
            date: new.date.format(DATE_FORMAT).to_string(),
            created_at: now(),
        };
        self.conn()?.execute(
            "INSERT INTO expenses (id, user_id, category_id, amount, description, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                expense.id,
                expense.user_id,
                expense.category_id,
                expense.amount,
                expense.description,
                expense.date,
                expense.created_at,
            ],
        )?;
        Ok(expense)
    }

    /// Get a user by id.
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let user = self
            .conn()?
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                params![user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

/// Create all required tables if they don't exist.
fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT,
            email TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_categories_user
            ON categories(user_id, name);

        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            category_id TEXT,
            amount REAL NOT NULL,
            description TEXT,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id),
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_expenses_user_date
            ON expenses(user_id, date);

        CREATE TABLE IF NOT EXISTS ai_queries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            query_text TEXT,
            ai_response TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_ai_queries_user
            ON ai_queries(user_id, created_at);
        ",
    )?;
    Ok(())
}

// ─── ExpenseStore ───────────────────────────────────────────────────────────

const EXPENSE_COLUMNS: &str =
    "e.id, e.user_id, e.category_id, e.amount, e.description, e.date, e.created_at";

impl ExpenseStore for ExpenseDatabase {
    fn list_expenses(&self, user_id: &str, range: DateRange) -> Result<Vec<Expense>, StoreError> {
        let start = range.start.map(|d| d.format(DATE_FORMAT).to_string());
        let end = range.end.map(|d| d.format(DATE_FORMAT).to_string());

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS}
             FROM expenses e
             WHERE e.user_id = ?1
               AND (?2 IS NULL OR e.date >= ?2)
               AND (?3 IS NULL OR e.date <= ?3)
             ORDER BY e.date DESC, e.rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user_id, start, end], row_to_expense)?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(row?);
        }
        Ok(expenses)
    }

    fn list_expenses_with_categories(
        &self,
        user_id: &str,
    ) -> Result<Vec<ExpenseWithCategory>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXPENSE_COLUMNS}, c.id, c.name
             FROM expenses e
             LEFT JOIN categories c ON c.id = e.category_id
             WHERE e.user_id = ?1
             ORDER BY e.date DESC, e.rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], |row| {
            let expense = row_to_expense(row)?;
            let category_id: Option<String> = row.get(7)?;
            let category_name: Option<String> = row.get(8)?;
            let categories = match (category_id, category_name) {
                (Some(id), Some(name)) => Some(CategoryRef { id, name }),
                _ => None,
            };
            Ok(ExpenseWithCategory {
                expense,
                categories,
            })
        })?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(row?);
        }
        Ok(expenses)
    }

    fn expense_amounts_by_category(&self, user_id: &str) -> Result<Vec<CategoryAmount>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.category_id, c.name, e.amount
             FROM expenses e
             LEFT JOIN categories c ON c.id = e.category_id
             WHERE e.user_id = ?1",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(CategoryAmount {
                category_id: row.get(0)?,
                category_name: row.get(1)?,
                amount: row.get(2)?,
            })
        })?;

        let mut amounts = Vec::new();
        for row in rows {
            amounts.push(row?);
        }
        Ok(amounts)
    }

    fn total_expenses(&self, user_id: &str) -> Result<f64, StoreError> {
        let total: f64 = self.conn()?.query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM expenses WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn list_categories(&self, user_id: &str) -> Result<Vec<Category>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, created_at
             FROM categories
             WHERE user_id = ?1
             ORDER BY name ASC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }
}

// ─── QueryLog ───────────────────────────────────────────────────────────────

const AI_QUERY_COLUMNS: &str = "id, user_id, query_text, ai_response, created_at";

impl QueryLog for ExpenseDatabase {
    fn ensure_user(&self, user_id: &str) -> Result<User, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (id, name, email, created_at) VALUES (?1, NULL, NULL, ?2)",
            params![user_id, now()],
        )?;
        let user = conn.query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            params![user_id],
            row_to_user,
        )?;
        Ok(user)
    }

    fn save_query(&self, query: &NewAiQuery) -> Result<AiQuery, StoreError> {
        self.ensure_user(&query.user_id)?;
        let saved = AiQuery {
            id: Uuid::new_v4().to_string(),
            user_id: query.user_id.clone(),
            query_text: query.query_text.clone(),
            ai_response: query.ai_response.clone(),
            created_at: now(),
        };
        self.conn()?.execute(
            "INSERT INTO ai_queries (id, user_id, query_text, ai_response, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                saved.id,
                saved.user_id,
                saved.query_text,
                saved.ai_response,
                saved.created_at,
            ],
        )?;
        Ok(saved)
    }

    fn recent_queries(&self, user_id: &str, limit: usize) -> Result<Vec<AiQuery>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AI_QUERY_COLUMNS}
             FROM ai_queries
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![user_id, limit as i64], row_to_ai_query)?;

        let mut queries = Vec::new();
        for row in rows {
            queries.push(row?);
        }
        Ok(queries)
    }

    fn search_queries(&self, user_id: &str, text: &str) -> Result<Vec<AiQuery>, StoreError> {
        let conn = self.conn()?;
        // instr() instead of LIKE so `%` and `_` in the search text are literal.
        let mut stmt = conn.prepare(&format!(
            "SELECT {AI_QUERY_COLUMNS}
             FROM ai_queries
             WHERE user_id = ?1
               AND (instr(lower(COALESCE(query_text, '')), lower(?2)) > 0
                    OR instr(lower(COALESCE(ai_response, '')), lower(?2)) > 0)
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user_id, text], row_to_ai_query)?;

        let mut queries = Vec::new();
        for row in rows {
            queries.push(row?);
        }
        Ok(queries)
    }

    fn delete_query(&self, user_id: &str, query_id: &str) -> Result<bool, StoreError> {
        let removed = self.conn()?.execute(
            "DELETE FROM ai_queries WHERE id = ?1 AND user_id = ?2",
            params![query_id, user_id],
        )?;
        Ok(removed > 0)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// RFC 3339 timestamp with microseconds, so lexical order is time order.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Convert the first seven columns of a row to an Expense.
fn row_to_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_ai_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<AiQuery> {
    Ok(AiQuery {
        id: row.get(0)?,
        user_id: row.get(1)?,
        query_text: row.get(2)?,
        ai_response: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_db() -> ExpenseDatabase {
        ExpenseDatabase::open(":memory:").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn add_expense(db: &ExpenseDatabase, user: &str, category: Option<&str>, amount: f64, day: &str) {
        db.insert_expense(&NewExpense {
            user_id: user.to_string(),
            category_id: category.map(String::from),
            amount,
            description: Some(format!("spent {amount}")),
            date: date(day),
        })
        .unwrap();
    }

    #[test]
    fn test_ensure_user_is_idempotent() {
        let db = test_db();
        let first = db.ensure_user("u1").unwrap();
        let second = db.ensure_user("u1").unwrap();
        assert_eq!(first, second);
        assert!(db.get_user("u1").unwrap().is_some());
        assert!(db.get_user("nobody").unwrap().is_none());
    }

    #[test]
    fn test_list_expenses_newest_first_and_scoped() {
        let db = test_db();
        add_expense(&db, "u1", None, 10.0, "2024-01-05");
        add_expense(&db, "u1", None, 20.0, "2024-03-01");
        add_expense(&db, "u2", None, 99.0, "2024-02-01");

        let expenses = db.list_expenses("u1", DateRange::unbounded()).unwrap();
        assert_eq!(expenses.len(), 2);
        assert_eq!(expenses[0].date, "2024-03-01");
        assert!(expenses.iter().all(|e| e.user_id == "u1"));
    }

    #[test]
    fn test_list_expenses_date_bounds_inclusive() {
        let db = test_db();
        add_expense(&db, "u1", None, 1.0, "2024-01-01");
        add_expense(&db, "u1", None, 2.0, "2024-01-31");
        add_expense(&db, "u1", None, 3.0, "2024-02-01");

        let january = DateRange {
            start: Some(date("2024-01-01")),
            end: Some(date("2024-01-31")),
        };
        assert_eq!(db.list_expenses("u1", january).unwrap().len(), 2);

        let from_feb = DateRange {
            start: Some(date("2024-02-01")),
            end: None,
        };
        let rows = db.list_expenses("u1", from_feb).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 3.0);
    }

    #[test]
    fn test_expenses_with_categories_join() {
        let db = test_db();
        let food = db.insert_category("u1", "Food").unwrap();
        add_expense(&db, "u1", Some(&food.id), 12.0, "2024-01-02");
        add_expense(&db, "u1", None, 5.0, "2024-01-01");

        let rows = db.list_expenses_with_categories("u1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].categories.as_ref().map(|c| c.name.as_str()), Some("Food"));
        assert!(rows[1].categories.is_none());
    }

    #[test]
    fn test_amounts_by_category_and_total() {
        let db = test_db();
        let food = db.insert_category("u1", "Food").unwrap();
        add_expense(&db, "u1", Some(&food.id), 100.0, "2024-01-02");
        add_expense(&db, "u1", Some(&food.id), 20.5, "2024-01-03");
        add_expense(&db, "u1", None, 8.0, "2024-01-04");

        let amounts = db.expense_amounts_by_category("u1").unwrap();
        assert_eq!(amounts.len(), 3);
        assert_eq!(
            amounts.iter().filter(|a| a.category_name.as_deref() == Some("Food")).count(),
            2
        );
        assert!((db.total_expenses("u1").unwrap() - 128.5).abs() < 1e-9);
        assert_eq!(db.total_expenses("nobody").unwrap(), 0.0);
    }

    #[test]
    fn test_list_categories_sorted_by_name() {
        let db = test_db();
        db.insert_category("u1", "Travel").unwrap();
        db.insert_category("u1", "Food").unwrap();
        db.insert_category("u2", "Rent").unwrap();

        let names: Vec<String> = db
            .list_categories("u1")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Food", "Travel"]);
    }

    #[test]
    fn test_saved_queries_recent_search_delete() {
        let db = test_db();
        for (q, a) in [
            ("What did I spend on food?", "You spent $120 on Food."),
            ("Total?", "You've spent $128.50 in total."),
            ("100% of rent?", "Rent is 40%."),
        ] {
            db.save_query(&NewAiQuery {
                user_id: "u1".into(),
                query_text: Some(q.into()),
                ai_response: Some(a.into()),
            })
            .unwrap();
        }
        db.save_query(&NewAiQuery {
            user_id: "u2".into(),
            query_text: Some("food".into()),
            ai_response: None,
        })
        .unwrap();

        let recent = db.recent_queries("u1", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query_text.as_deref(), Some("100% of rent?"));

        let found = db.search_queries("u1", "FOOD").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(db.search_queries("u1", "%").unwrap().len(), 1);

        let id = found[0].id.clone();
        assert!(!db.delete_query("u2", &id).unwrap());
        assert!(db.delete_query("u1", &id).unwrap());
        assert!(db.search_queries("u1", "food").unwrap().is_empty());
    }
}
