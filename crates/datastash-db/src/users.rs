// ABOUTME: App-scoped user table helpers over the embedded engine.
// ABOUTME: Several applications share one users table, partitioned by an app column.

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use thiserror::Error;

/// Errors from user-table operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("username already taken")]
    UsernameTaken,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A stored user, minus the password.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub app: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// Input for registration. Passwords are stored as given; credential
/// hashing is outside this layer.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Headline numbers for one app's slice of the shared table.
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub app: String,
    pub user_count: i64,
    pub total_users: i64,
}

/// Create the users table if absent, or retrofit the app column onto an
/// older single-app table.
pub fn ensure_users_table(conn: &Connection) -> Result<(), UserError> {
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'users'",
            [],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !exists {
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app TEXT NOT NULL,
                username TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                password TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_login TEXT,
                UNIQUE(app, username)
            );",
        )?;
        return Ok(());
    }

    let has_app_column: bool = {
        let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;
        names.iter().any(|n| n == "app")
    };

    if !has_app_column {
        conn.execute("ALTER TABLE users ADD COLUMN app TEXT NOT NULL DEFAULT ''", [])?;
    }
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get("id")?,
        app: row.get("app")?,
        username: row.get("username")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        role: row.get("role")?,
        created_at: row.get("created_at")?,
        last_login: row.get("last_login")?,
    })
}

const SELECT_COLUMNS: &str =
    "id, app, username, email, first_name, last_name, role, created_at, last_login";

pub fn username_exists(conn: &Connection, app: &str, username: &str) -> Result<bool, UserError> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM users WHERE app = ?1 AND lower(username) = lower(?2)",
        params![app, username],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_user(
    conn: &Connection,
    app: &str,
    username: &str,
) -> Result<Option<UserRecord>, UserError> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {} FROM users WHERE app = ?1 AND lower(username) = lower(?2)",
                SELECT_COLUMNS
            ),
            params![app, username],
            row_to_record,
        )
        .optional()?;
    Ok(result)
}

/// Insert a new user scoped to `app`. Usernames are unique per app, not
/// globally, so the same name may exist under two different apps.
pub fn register_user(conn: &Connection, app: &str, user: &NewUser) -> Result<UserRecord, UserError> {
    if username_exists(conn, app, &user.username)? {
        return Err(UserError::UsernameTaken);
    }

    conn.execute(
        "INSERT INTO users (app, username, email, password, first_name, last_name)
         VALUES (?1, lower(?2), lower(?3), ?4, ?5, ?6)",
        params![
            app,
            user.username,
            user.email,
            user.password,
            user.first_name,
            user.last_name
        ],
    )?;

    get_user(conn, app, &user.username)?.ok_or(UserError::Sqlite(
        rusqlite::Error::QueryReturnedNoRows,
    ))
}

/// Look up by username or email within one app and compare the password.
/// A match records the login time; no match is `None`, not an error.
pub fn authenticate_user(
    conn: &Connection,
    app: &str,
    username_or_email: &str,
    password: &str,
) -> Result<Option<UserRecord>, UserError> {
    let matched = conn
        .query_row(
            &format!(
                "SELECT {} FROM users
                 WHERE app = ?1
                   AND (lower(username) = lower(?2) OR lower(email) = lower(?2))
                   AND password = ?3",
                SELECT_COLUMNS
            ),
            params![app, username_or_email, password],
            row_to_record,
        )
        .optional()?;

    if let Some(user) = &matched {
        conn.execute(
            "UPDATE users SET last_login = datetime('now') WHERE id = ?1",
            params![user.id],
        )?;
    }
    Ok(matched)
}

pub fn list_users(conn: &Connection, app: &str) -> Result<Vec<UserRecord>, UserError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE app = ?1 ORDER BY created_at ASC, id ASC",
        SELECT_COLUMNS
    ))?;
    let users = stmt
        .query_map(params![app], row_to_record)?
        .collect::<Result<_, _>>()?;
    Ok(users)
}

pub fn app_status(conn: &Connection, app: &str) -> Result<AppStatus, UserError> {
    let total_users: i64 =
        conn.query_row("SELECT count(*) FROM users", [], |row| row.get(0))?;
    let user_count: i64 = conn.query_row(
        "SELECT count(*) FROM users WHERE app = ?1",
        params![app],
        |row| row.get(0),
    )?;
    Ok(AppStatus {
        app: app.to_string(),
        user_count,
        total_users,
    })
}
