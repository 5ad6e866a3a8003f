//! SQLite implementation of the account store

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{Account, AccountRepository, AccountStatus, NewAccount, RunRecord};

/// RFC3339 in UTC with millisecond precision, so text ordering matches time ordering.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to parse {}: {}", column, e))
}

fn parse_optional_timestamp(column: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_timestamp(column, &raw)).transpose()
}

const ACCOUNT_COLUMNS: &str = "id, login, encrypted_secret, is_active, status, last_run_at, \
                               last_success_at, next_run_at, notes, created_at";

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let created_at: String = row.try_get("created_at")?;
        Ok(Account {
            id: row.try_get("id")?,
            login: row.try_get("login")?,
            encrypted_secret: row.try_get("encrypted_secret")?,
            is_active: row.try_get("is_active")?,
            status: row.try_get::<AccountStatus, _>("status")?,
            last_run_at: parse_optional_timestamp("last_run_at", row.try_get("last_run_at")?)?,
            last_success_at: parse_optional_timestamp(
                "last_success_at",
                row.try_get("last_success_at")?,
            )?,
            next_run_at: parse_optional_timestamp("next_run_at", row.try_get("next_run_at")?)?,
            notes: row.try_get("notes")?,
            created_at: parse_timestamp("created_at", &created_at)?,
        })
    }

    async fn fetch_where(&self, clause: &str) -> Result<Vec<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts {clause} ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_account).collect()
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn list_active(&self) -> Result<Vec<Account>> {
        self.fetch_where("WHERE is_active = 1").await
    }

    async fn list_all(&self) -> Result<Vec<Account>> {
        self.fetch_where("").await
    }

    async fn get(&self, id: i64) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE login = ?");
        let row = sqlx::query(&sql).bind(login).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn create(&self, account: NewAccount) -> Result<Account> {
        let created_at = format_timestamp(Utc::now());
        let id = sqlx::query(
            r"
            INSERT INTO accounts (login, encrypted_secret, is_active, status, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&account.login)
        .bind(&account.encrypted_secret)
        .bind(account.is_active)
        .bind(AccountStatus::Idle)
        .bind(&account.notes)
        .bind(&created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("account {} vanished after insert", id))
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_secret(&self, id: i64, encrypted_secret: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE accounts SET encrypted_secret = ? WHERE id = ?")
            .bind(encrypted_secret)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Outcome records are never removed, so an account that has any is kept.
    async fn delete(&self, id: i64) -> Result<bool> {
        let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM update_logs WHERE account_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if history > 0 {
            return Err(anyhow!(
                "Account {} has {} outcome record(s) and cannot be removed; deactivate it instead",
                id,
                history
            ));
        }

        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_running(&self, id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET status = ? WHERE id = ?")
            .bind(AccountStatus::Running)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no account with id {}", id));
        }
        Ok(())
    }

    async fn record_run(&self, id: i64, record: &RunRecord) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET status = ?,
                last_run_at = ?,
                last_success_at = COALESCE(?, last_success_at),
                next_run_at = COALESCE(?, next_run_at)
            WHERE id = ?
            ",
        )
        .bind(&record.status)
        .bind(format_timestamp(record.ran_at))
        .bind(record.success_at.map(format_timestamp))
        .bind(record.next_run_at.map(format_timestamp))
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("no account with id {}", id));
        }
        Ok(())
    }
}
