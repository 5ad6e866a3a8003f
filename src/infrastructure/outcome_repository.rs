//! SQLite implementation of the append-only outcome log

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::account_repository::{format_timestamp, parse_timestamp};
use crate::domain::{
    ChangedFields, DailyOutcomeCounts, NewOutcome, OutcomeKind, OutcomeQuery, OutcomeRecord,
    OutcomeRepository, OutcomeStats, OutcomeSummary,
};

const RECENT_IN_SUMMARY: u32 = 10;

pub struct SqliteOutcomeRepository {
    pool: SqlitePool,
}

impl SqliteOutcomeRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<OutcomeRecord> {
        let outcome: String = row.try_get("outcome")?;
        let fields_edited: String = row.try_get("fields_edited")?;
        let executed_at: String = row.try_get("executed_at")?;
        let duration_ms: i64 = row.try_get("duration_ms")?;

        Ok(OutcomeRecord {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            account_login: row.try_get("login")?,
            kind: outcome.parse::<OutcomeKind>()?,
            duration_ms: u64::try_from(duration_ms).unwrap_or(0),
            changed_fields: serde_json::from_str::<ChangedFields>(&fields_edited)
                .context("Failed to parse fields_edited")?,
            detail: row.try_get("detail")?,
            executed_at: parse_timestamp("executed_at", &executed_at)?,
        })
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &OutcomeQuery) {
        builder.push(" WHERE 1 = 1");
        if let Some(account_id) = query.account_id {
            builder.push(" AND l.account_id = ").push_bind(account_id);
        }
        if let Some(kind) = query.kind {
            builder.push(" AND l.outcome = ").push_bind(kind.as_str());
        }
        if let Some(since) = query.since {
            builder.push(" AND l.executed_at >= ").push_bind(format_timestamp(since));
        }
        if let Some(until) = query.until {
            builder.push(" AND l.executed_at <= ").push_bind(format_timestamp(until));
        }
    }

    async fn average_duration(&self, window: &OutcomeQuery) -> Result<Option<f64>> {
        let mut average = QueryBuilder::<Sqlite>::new(
            "SELECT AVG(l.duration_ms) AS avg_ms FROM update_logs l",
        );
        Self::push_filters(&mut average, window);
        Ok(average
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get::<Option<f64>, _>("avg_ms")?)
    }
}

fn check_window(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Result<()> {
    match (since, until) {
        (Some(since), Some(until)) if since > until => {
            Err(anyhow!("outcome window starts after it ends"))
        }
        _ => Ok(()),
    }
}

fn count_column(row: &sqlx::sqlite::SqliteRow) -> Result<(OutcomeKind, u64)> {
    let outcome: String = row.try_get("outcome")?;
    let n: i64 = row.try_get("n")?;
    Ok((outcome.parse()?, u64::try_from(n).unwrap_or(0)))
}

#[async_trait]
impl OutcomeRepository for SqliteOutcomeRepository {
    async fn append(&self, outcome: NewOutcome) -> Result<OutcomeRecord> {
        let fields_edited = serde_json::to_string(&outcome.changed_fields)?;
        let duration_ms = i64::try_from(outcome.duration_ms).unwrap_or(i64::MAX);

        let id = sqlx::query(
            r"
            INSERT INTO update_logs (account_id, executed_at, outcome, duration_ms, fields_edited, detail)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(outcome.account_id)
        .bind(format_timestamp(outcome.executed_at))
        .bind(outcome.kind.as_str())
        .bind(duration_ms)
        .bind(&fields_edited)
        .bind(&outcome.detail)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let login: Option<String> = sqlx::query_scalar("SELECT login FROM accounts WHERE id = ?")
            .bind(outcome.account_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(OutcomeRecord {
            id,
            account_id: outcome.account_id,
            account_login: login,
            kind: outcome.kind,
            duration_ms: outcome.duration_ms,
            changed_fields: outcome.changed_fields,
            detail: outcome.detail,
            executed_at: outcome.executed_at,
        })
    }

    async fn query(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT l.id, l.account_id, a.login, l.executed_at, l.outcome, l.duration_ms, \
             l.fields_edited, l.detail \
             FROM update_logs l LEFT JOIN accounts a ON a.id = l.account_id",
        );
        Self::push_filters(&mut builder, query);
        builder.push(" ORDER BY l.executed_at DESC, l.id DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn summary(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<OutcomeSummary> {
        check_window(Some(since), Some(until))?;
        let window = OutcomeQuery {
            since: Some(since),
            until: Some(until),
            ..OutcomeQuery::default()
        };

        let mut counts = QueryBuilder::<Sqlite>::new(
            "SELECT l.outcome AS outcome, COUNT(*) AS n FROM update_logs l",
        );
        Self::push_filters(&mut counts, &window);
        counts.push(" GROUP BY l.outcome");
        let count_rows = counts.build().fetch_all(&self.pool).await?;

        let mut summary = OutcomeSummary {
            since: Some(since),
            until: Some(until),
            ..OutcomeSummary::default()
        };
        for row in &count_rows {
            let (kind, n) = count_column(row)?;
            summary.add_count(kind, n);
        }

        summary.average_duration_ms = self.average_duration(&window).await?;

        summary.recent = self
            .query(&OutcomeQuery {
                limit: Some(RECENT_IN_SUMMARY),
                ..window
            })
            .await?;

        Ok(summary)
    }

    async fn stats(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<OutcomeStats> {
        check_window(since, until)?;
        let window = OutcomeQuery {
            since,
            until,
            ..OutcomeQuery::default()
        };

        let mut grouped = QueryBuilder::<Sqlite>::new(
            "SELECT l.account_id AS account_id, a.login AS login, l.outcome AS outcome, \
             COUNT(*) AS n \
             FROM update_logs l LEFT JOIN accounts a ON a.id = l.account_id",
        );
        Self::push_filters(&mut grouped, &window);
        grouped.push(" GROUP BY l.account_id, l.outcome ORDER BY l.account_id");
        let rows = grouped.build().fetch_all(&self.pool).await?;

        let mut stats = OutcomeStats::new(since, until);
        for row in &rows {
            let (kind, n) = count_column(row)?;
            stats.add(row.try_get("account_id")?, row.try_get("login")?, kind, n);
        }
        stats.finish(self.average_duration(&window).await?);
        Ok(stats)
    }

    async fn daily_counts(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DailyOutcomeCounts>> {
        check_window(Some(since), Some(until))?;
        let window = OutcomeQuery {
            since: Some(since),
            until: Some(until),
            ..OutcomeQuery::default()
        };

        // Stored timestamps are UTC RFC3339, so the first ten characters are the day.
        let mut grouped = QueryBuilder::<Sqlite>::new(
            "SELECT substr(l.executed_at, 1, 10) AS day, l.outcome AS outcome, COUNT(*) AS n \
             FROM update_logs l",
        );
        Self::push_filters(&mut grouped, &window);
        grouped.push(" GROUP BY day, l.outcome ORDER BY day DESC");
        let rows = grouped.build().fetch_all(&self.pool).await?;

        let mut days: Vec<DailyOutcomeCounts> = Vec::new();
        for row in &rows {
            let day: String = row.try_get("day")?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .with_context(|| format!("Failed to parse day '{day}'"))?;
            let (kind, n) = count_column(row)?;
            match days.last_mut() {
                Some(entry) if entry.date == date => entry.counts.add(kind, n),
                _ => {
                    let mut entry = DailyOutcomeCounts::empty(date);
                    entry.counts.add(kind, n);
                    days.push(entry);
                }
            }
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountRepository, FieldChange, NewAccount};
    use crate::infrastructure::SqliteAccountRepository;
    use crate::test_utils::TestDatabase;
    use chrono::Duration;

    async fn setup() -> (TestDatabase, SqliteOutcomeRepository, i64, i64) {
        let db = TestDatabase::new().await.unwrap();
        let accounts = SqliteAccountRepository::new(db.pool());
        let mut ids = Vec::new();
        for login in ["alpha", "bravo"] {
            let account = accounts
                .create(NewAccount {
                    login: login.into(),
                    encrypted_secret: "x".into(),
                    is_active: true,
                    notes: None,
                })
                .await
                .unwrap();
            ids.push(account.id);
        }
        let repo = SqliteOutcomeRepository::new(db.pool());
        (db, repo, ids[0], ids[1])
    }

    fn outcome(account_id: i64, kind: OutcomeKind, at: DateTime<Utc>, ms: u64) -> NewOutcome {
        NewOutcome {
            account_id,
            kind,
            duration_ms: ms,
            changed_fields: ChangedFields::new(),
            detail: format!("{kind} for {account_id}"),
            executed_at: at,
        }
    }

    #[tokio::test]
    async fn append_round_trips_changed_fields() {
        let (_db, repo, alpha, _) = setup().await;
        let mut fields = ChangedFields::new();
        fields.insert("personal_statement".into(), FieldChange::new("old", "new"));

        let stored = repo
            .append(NewOutcome {
                changed_fields: fields.clone(),
                ..outcome(alpha, OutcomeKind::Success, Utc::now(), 1200)
            })
            .await
            .unwrap();
        assert_eq!(stored.account_login.as_deref(), Some("alpha"));

        let read = repo.query(&OutcomeQuery::recent(5)).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].changed_fields, fields);
        assert_eq!(read[0].duration_ms, 1200);
        assert_eq!(read[0].account_login.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn query_is_newest_first_and_filtered() {
        let (_db, repo, alpha, bravo) = setup().await;
        let base = Utc::now() - Duration::hours(3);
        repo.append(outcome(alpha, OutcomeKind::Success, base, 10)).await.unwrap();
        repo.append(outcome(bravo, OutcomeKind::Failure, base + Duration::hours(1), 20))
            .await
            .unwrap();
        repo.append(outcome(alpha, OutcomeKind::NoChange, base + Duration::hours(2), 30))
            .await
            .unwrap();

        let all = repo.query(&OutcomeQuery::default()).await.unwrap();
        let kinds: Vec<OutcomeKind> = all.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![OutcomeKind::NoChange, OutcomeKind::Failure, OutcomeKind::Success]
        );

        let alpha_only = repo
            .query(&OutcomeQuery { account_id: Some(alpha), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(alpha_only.len(), 2);

        let failures = repo
            .query(&OutcomeQuery { kind: Some(OutcomeKind::Failure), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].account_id, bravo);

        assert_eq!(repo.query(&OutcomeQuery::recent(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn summary_counts_only_the_window() {
        let (_db, repo, alpha, bravo) = setup().await;
        let now = Utc::now();
        repo.append(outcome(alpha, OutcomeKind::Success, now - Duration::days(10), 999))
            .await
            .unwrap();
        repo.append(outcome(alpha, OutcomeKind::Success, now - Duration::days(1), 100))
            .await
            .unwrap();
        repo.append(outcome(bravo, OutcomeKind::Failure, now - Duration::hours(1), 300))
            .await
            .unwrap();

        let summary = repo.summary(now - Duration::days(7), now).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failure, 1);
        assert_eq!(summary.average_duration_ms, Some(200.0));
        assert_eq!(summary.recent.len(), 2);
    }

    #[tokio::test]
    async fn empty_summary_has_no_average() {
        let (_db, repo, _, _) = setup().await;
        let now = Utc::now();
        let summary = repo.summary(now - Duration::days(7), now).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average_duration_ms, None);
        assert!(summary.recent.is_empty());
    }

    #[tokio::test]
    async fn accounts_with_history_cannot_be_deleted() {
        let (db, repo, alpha, bravo) = setup().await;
        repo.append(outcome(alpha, OutcomeKind::Success, Utc::now(), 1)).await.unwrap();
        let accounts = SqliteAccountRepository::new(db.pool());

        let err = accounts.delete(alpha).await.unwrap_err();
        assert!(err.to_string().contains("deactivate"), "{err:#}");
        assert!(accounts.get(alpha).await.unwrap().is_some());
        assert_eq!(repo.query(&OutcomeQuery::default()).await.unwrap().len(), 1);

        // Nothing recorded yet, so removal is allowed.
        assert!(accounts.delete(bravo).await.unwrap());
    }

    #[tokio::test]
    async fn raw_delete_is_blocked_by_the_foreign_key() {
        let (db, repo, alpha, _) = setup().await;
        repo.append(outcome(alpha, OutcomeKind::Failure, Utc::now(), 1)).await.unwrap();
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(alpha)
            .execute(&db.pool())
            .await;
        assert!(result.is_err());
        assert_eq!(repo.query(&OutcomeQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_break_down_per_account() {
        let (_db, repo, alpha, bravo) = setup().await;
        let now = Utc::now();
        for (account, kind, at, ms) in [
            (alpha, OutcomeKind::Success, now - Duration::hours(1), 100),
            (alpha, OutcomeKind::Failure, now - Duration::days(2), 300),
            (alpha, OutcomeKind::Success, now - Duration::days(30), 200),
            (bravo, OutcomeKind::NoChange, now - Duration::hours(1), 200),
        ] {
            repo.append(outcome(account, kind, at, ms)).await.unwrap();
        }

        let all = repo.stats(None, None).await.unwrap();
        assert_eq!(all.counts.total, 4);
        assert_eq!(all.counts.success, 2);
        assert_eq!(all.success_rate_percentage, 50.0);
        assert_eq!(all.average_duration_ms, Some(200.0));
        assert_eq!(all.per_account.len(), 2);
        assert_eq!(all.per_account[0].account_login.as_deref(), Some("alpha"));
        assert_eq!(all.per_account[0].counts.total, 3);
        assert_eq!(all.per_account[0].counts.failure, 1);
        assert_eq!(all.per_account[1].counts.no_change, 1);

        let week = repo
            .stats(Some(now - Duration::days(7)), Some(now))
            .await
            .unwrap();
        assert_eq!(week.counts.total, 3);
        assert_eq!(week.success_rate_percentage, 33.33);
        assert_eq!(week.average_duration_ms, Some(200.0));

        assert!(repo.stats(Some(now), Some(now - Duration::days(1))).await.is_err());
    }

    #[tokio::test]
    async fn daily_counts_group_by_utc_day() {
        let (_db, repo, alpha, bravo) = setup().await;
        let now = Utc::now();
        let recent = now - Duration::hours(1);
        let earlier = now - Duration::days(2);
        repo.append(outcome(alpha, OutcomeKind::Success, recent, 1)).await.unwrap();
        repo.append(outcome(bravo, OutcomeKind::NoChange, recent, 1)).await.unwrap();
        repo.append(outcome(alpha, OutcomeKind::Failure, earlier, 1)).await.unwrap();
        repo.append(outcome(alpha, OutcomeKind::Failure, now - Duration::days(20), 1))
            .await
            .unwrap();

        let days = repo.daily_counts(now - Duration::days(7), now).await.unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, recent.date_naive());
        assert_eq!(days[0].counts.total, 2);
        assert_eq!(days[0].counts.no_change, 1);
        assert_eq!(days[1].date, earlier.date_naive());
        assert_eq!(days[1].counts.failure, 1);
    }
}
