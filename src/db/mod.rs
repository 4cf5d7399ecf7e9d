/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Forum database abstraction

use std::{collections::HashSet, fmt, future::Future, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use sea_query::{Expr, Iden, Query, SelectStatement};
use sea_query_binder::SqlxBinder;
use sqlx::{Connection as _, Row};
use thiserror::Error;

use crate::{path::PathError, settings::Settings};

#[cfg(not(feature = "postgres"))]
use sea_query::SqliteQueryBuilder as Builder;

#[cfg(feature = "postgres")]
use sea_query::PostgresQueryBuilder as Builder;

pub mod forums;
pub mod migrations;
pub mod posts;
pub mod threads;
pub mod users;
pub mod votes;

#[cfg(not(feature = "postgres"))]
pub type Db = sqlx::Sqlite;

#[cfg(feature = "postgres")]
pub type Db = sqlx::Postgres;

pub type DbConnection = <Db as sqlx::Database>::Connection;
pub type DbRow = <Db as sqlx::Database>::Row;
pub type Transaction = sqlx::Transaction<'static, Db>;

#[derive(Clone)]
pub enum Pool {
    Pool(sqlx::Pool<Db>),
}

/// The record a [`DbError::NotFound`] refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Missing {
    User(String),
    Forum(String),
    Thread(threads::ThreadRef),
    Post(i64),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Missing::User(nickname) => write!(f, "user by nickname: {}", nickname),
            Missing::Forum(slug) => write!(f, "forum by slug: {}", slug),
            Missing::Thread(thread) => write!(f, "thread by slug or id: {}", thread),
            Missing::Post(id) => write!(f, "post by id: {}", id),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQL error")]
    SqlxError(#[from] sqlx::error::Error),
    #[error("Date parsing error")]
    ChronoError(#[from] chrono::ParseError),
    #[error("Invalid post path")]
    PathError(#[from] PathError),
    #[error("Unsupported database connection string")]
    UnsupportedConnectionString,
    #[error("Invalid value in column")]
    ColumnTypeError,
    #[error("Can't find {0}")]
    NotFound(Missing),
    #[error("Can't find post author by nickname: {0}")]
    UnknownAuthor(String),
    #[error("Parent post {parent} was created in another thread")]
    CrossThreadParent { parent: i64 },
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },
    #[error("Invalid input: {0}")]
    ValidationError(String),
    #[error("Operation timed out")]
    Timeout,
}

impl DbError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::SqlxError(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            DbError::SqlxError(sqlx::Error::Database(e)) => e.is_foreign_key_violation(),
            _ => false,
        }
    }
}

/// Outcome of a create operation. A duplicate key is an expected result
/// carrying the record that already exists, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Creation<T, C = T> {
    Created(T),
    Conflict(C),
}

impl<T, C> Creation<T, C> {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Creation::Conflict(_))
    }
}

impl<T> Creation<T> {
    pub fn into_inner(self) -> T {
        match self {
            Creation::Created(value) => value,
            Creation::Conflict(value) => value,
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Status {
    pub user: i64,
    pub forum: i64,
    pub thread: i64,
    pub post: i64,
}

#[derive(Iden)]
enum Versions {
    Table,
    Version,
}

impl Pool {
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(settings: &Settings) -> Result<Pool, DbError> {
        use std::str::FromStr;
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

        if !settings.database.starts_with("sqlite:") {
            return Err(DbError::UnsupportedConnectionString);
        }
        let options = SqliteConnectOptions::from_str(&settings.database)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout());
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;
        Ok(Pool::Pool(pool))
    }

    #[cfg(feature = "postgres")]
    pub async fn connect(settings: &Settings) -> Result<Pool, DbError> {
        use sqlx::postgres::PgPoolOptions;

        if !settings.database.starts_with("postgres:") && !settings.database.starts_with("postgresql:") {
            return Err(DbError::UnsupportedConnectionString);
        }
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database)
            .await?;
        Ok(Pool::Pool(pool))
    }

    pub async fn begin(&self) -> Result<Transaction, DbError> {
        let Pool::Pool(pool) = self;
        Ok(pool.begin().await?)
    }

    pub async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Db>, DbError> {
        let Pool::Pool(pool) = self;
        Ok(pool.acquire().await?)
    }

    pub async fn close(&self) {
        let Pool::Pool(pool) = self;
        pool.close().await;
    }
}

pub async fn select<S: SqlxBinder>(conn: &mut DbConnection, query: &S) -> Result<Vec<DbRow>, DbError> {
    let (sql, values) = query.build_sqlx(Builder);
    Ok(sqlx::query_with::<Db, _>(&sql, values).fetch_all(&mut *conn).await?)
}

pub async fn select_one<S: SqlxBinder>(conn: &mut DbConnection, query: &S) -> Result<DbRow, DbError> {
    let (sql, values) = query.build_sqlx(Builder);
    Ok(sqlx::query_with::<Db, _>(&sql, values).fetch_one(&mut *conn).await?)
}

pub async fn select_optional<S: SqlxBinder>(conn: &mut DbConnection, query: &S) -> Result<Option<DbRow>, DbError> {
    let (sql, values) = query.build_sqlx(Builder);
    Ok(sqlx::query_with::<Db, _>(&sql, values).fetch_optional(&mut *conn).await?)
}

/// Runs an insert carrying a `returning` clause and reads back the first column.
pub async fn insert_returning_id<S: SqlxBinder>(conn: &mut DbConnection, query: &S) -> Result<i64, DbError> {
    let row = select_one(conn, query).await?;
    Ok(row.try_get(0)?)
}

pub async fn execute<S: SqlxBinder>(conn: &mut DbConnection, query: &S) -> Result<u64, DbError> {
    let (sql, values) = query.build_sqlx(Builder);
    Ok(sqlx::query_with::<Db, _>(&sql, values).execute(&mut *conn).await?.rows_affected())
}

async fn count_rows(conn: &mut DbConnection, query: SelectStatement) -> Result<i64, DbError> {
    let row = select_one(conn, &query).await?;
    Ok(row.try_get(0)?)
}

/// Text form of a timestamp whose byte order is chronological.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, DbError> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

/// Bounds an operation by a deadline. The operation's transaction is dropped,
/// and therefore rolled back, when the deadline expires.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match async_std::future::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("operation exceeded deadline of {:?}", deadline);
            Err(DbError::Timeout)
        }
    }
}

pub async fn status(pool: &Pool) -> Result<Status, DbError> {
    let mut conn = pool.acquire().await?;
    Ok(Status {
        user: count_rows(&mut conn, Query::select()
            .expr(Expr::col(users::Users::Nickname).count())
            .from(users::Users::Table)
            .to_owned()).await?,
        forum: count_rows(&mut conn, Query::select()
            .expr(Expr::col(forums::Forums::Slug).count())
            .from(forums::Forums::Table)
            .to_owned()).await?,
        thread: count_rows(&mut conn, Query::select()
            .expr(Expr::col(threads::Threads::Id).count())
            .from(threads::Threads::Table)
            .to_owned()).await?,
        post: count_rows(&mut conn, Query::select()
            .expr(Expr::col(posts::Posts::Id).count())
            .from(posts::Posts::Table)
            .to_owned()).await?,
    })
}

/// Removes every user, forum, thread, post and vote.
pub async fn clear(pool: &Pool) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    execute(&mut tx, &Query::delete().from_table(votes::Votes::Table).to_owned()).await?;
    execute(&mut tx, &Query::delete().from_table(forums::ForumMembers::Table).to_owned()).await?;
    execute(&mut tx, &Query::delete().from_table(posts::Posts::Table).to_owned()).await?;
    execute(&mut tx, &Query::delete().from_table(threads::Threads::Table).to_owned()).await?;
    execute(&mut tx, &Query::delete().from_table(forums::Forums::Table).to_owned()).await?;
    execute(&mut tx, &Query::delete().from_table(users::Users::Table).to_owned()).await?;
    tx.commit().await?;
    info!("Cleared all forum data");
    Ok(())
}

pub async fn install(settings: &Settings) -> Result<Pool, DbError> {
    let pool = Pool::connect(settings).await?;
    let mut conn = pool.acquire().await?;
    sqlx::query("create table if not exists versions (version varchar(100) not null)")
        .execute(&mut *conn)
        .await?;
    let mut versions: HashSet<String> = HashSet::new();
    for row in sqlx::query("select version from versions").fetch_all(&mut *conn).await? {
        versions.insert(row.try_get("version")?);
    }
    if versions.is_empty() {
        info!("Installing new forum database...");
    }
    for (name, statements) in migrations::MIGRATIONS {
        if versions.contains(*name) {
            continue;
        }
        info!("Running migration: {}", name);
        let mut tx = conn.begin().await?;
        for statement in statements.iter() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        execute(&mut tx, &Query::insert()
            .into_table(Versions::Table)
            .columns([Versions::Version])
            .values_panic([(*name).into()])
            .to_owned()).await?;
        tx.commit().await?;
    }
    Ok(pool)
}
