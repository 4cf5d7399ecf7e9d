/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! DB queries related to threads

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_query::{ConditionalStatement, Expr, Iden, Order, OrderedStatement, Query, SelectStatement, SimpleExpr};
use sqlx::Row;

use super::{
    Creation, DbConnection, DbError, DbRow, Missing, Pool, execute, format_timestamp,
    forums, insert_returning_id, parse_timestamp, select, select_optional, users,
};

#[derive(Iden)]
pub enum Threads {
    Table,
    Id,
    Slug,
    Title,
    Message,
    Author,
    ForumSlug,
    CreatedAt,
    Votes,
}

/// A thread addressed either by its numeric id or by its slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThreadRef {
    Id(i64),
    Slug(String),
}

impl ThreadRef {
    /// A string of digits is an id, anything else is a slug.
    pub fn parse(slug_or_id: &str) -> Result<ThreadRef, DbError> {
        if slug_or_id.is_empty() {
            return Err(DbError::ValidationError("thread slug or id is empty".to_owned()));
        }
        if slug_or_id.bytes().all(|b| b.is_ascii_digit()) {
            slug_or_id.parse()
                .map(ThreadRef::Id)
                .map_err(|_| DbError::ValidationError(format!("thread id out of range: {}", slug_or_id)))
        } else {
            Ok(ThreadRef::Slug(slug_or_id.to_owned()))
        }
    }

    fn condition(&self) -> SimpleExpr {
        match self {
            ThreadRef::Id(id) => Expr::col((Threads::Table, Threads::Id)).eq(*id),
            ThreadRef::Slug(slug) => Expr::col((Threads::Table, Threads::Slug)).eq(slug.as_str()),
        }
    }
}

impl FromStr for ThreadRef {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreadRef::parse(s)
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ThreadRef::Id(id) => write!(f, "{}", id),
            ThreadRef::Slug(slug) => write!(f, "{}", slug),
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: i64,
    pub slug: Option<String>,
    pub title: String,
    pub message: String,
    pub author: String,
    pub forum: String,
    pub created: DateTime<Utc>,
    pub votes: i64,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct NewThread {
    pub slug: Option<String>,
    pub title: String,
    pub message: String,
    pub author: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct UpdateThread {
    pub title: Option<String>,
    pub message: Option<String>,
}

/// The canonical identity of a locked thread.
#[derive(Debug, Clone)]
pub(crate) struct ThreadKey {
    pub id: i64,
    pub forum: String,
}

fn get_default_thread_query() -> SelectStatement {
    Query::select()
        .columns([
            (Threads::Table, Threads::Id),
            (Threads::Table, Threads::Slug),
            (Threads::Table, Threads::Title),
            (Threads::Table, Threads::Message),
            (Threads::Table, Threads::Author),
            (Threads::Table, Threads::ForumSlug),
            (Threads::Table, Threads::CreatedAt),
            (Threads::Table, Threads::Votes),
        ])
        .from(Threads::Table)
        .to_owned()
}

fn thread_from_row(row: &DbRow) -> Result<Thread, DbError> {
    let created: String = row.try_get("created_at")?;
    Ok(Thread {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        author: row.try_get("author")?,
        forum: row.try_get("forum_slug")?,
        created: parse_timestamp(&created)?,
        votes: row.try_get("votes")?,
    })
}

pub(crate) async fn find_thread(conn: &mut DbConnection, thread: &ThreadRef) -> Result<Option<Thread>, DbError> {
    let row = select_optional(conn, get_default_thread_query()
        .and_where(thread.condition())).await?;
    row.as_ref().map(thread_from_row).transpose()
}

pub(crate) async fn find_thread_id(conn: &mut DbConnection, thread: &ThreadRef) -> Result<Option<i64>, DbError> {
    let row = select_optional(conn, Query::select()
        .column(Threads::Id)
        .from(Threads::Table)
        .and_where(thread.condition())).await?;
    Ok(match row {
        Some(row) => Some(row.try_get(0)?),
        None => None,
    })
}

/// Takes the write lock on a thread row before any dependent row is touched,
/// and resolves the thread to its id and forum.
pub(crate) async fn lock_thread(conn: &mut DbConnection, thread: &ThreadRef) -> Result<ThreadKey, DbError> {
    let locked = execute(conn, Query::update()
        .table(Threads::Table)
        .value(Threads::Votes, Expr::col(Threads::Votes))
        .and_where(thread.condition())).await?;
    if locked == 0 {
        return Err(DbError::NotFound(Missing::Thread(thread.clone())));
    }
    let row = select_optional(conn, Query::select()
        .columns([Threads::Id, Threads::ForumSlug])
        .from(Threads::Table)
        .and_where(thread.condition())).await?
        .ok_or_else(|| DbError::NotFound(Missing::Thread(thread.clone())))?;
    Ok(ThreadKey {
        id: row.try_get("id")?,
        forum: row.try_get("forum_slug")?,
    })
}

pub async fn get_thread(pool: &Pool, thread: &ThreadRef) -> Result<Option<Thread>, DbError> {
    let mut conn = pool.acquire().await?;
    find_thread(&mut conn, thread).await
}

/// Creates a thread in a forum. A taken slug yields the existing thread as
/// the conflict.
///
/// The forum's thread counter is bumped first, which locks the forum row
/// before anything is read; a failed creation rolls the count back.
pub async fn create_thread(pool: &Pool, forum_slug: &str, new_thread: NewThread) -> Result<Creation<Thread>, DbError> {
    let slug = new_thread.slug.filter(|slug| !slug.is_empty());
    let created = parse_timestamp(&format_timestamp(&new_thread.created.unwrap_or_else(Utc::now)))?;
    let mut tx = pool.begin().await?;
    if !forums::increment_thread_count(&mut tx, forum_slug).await? {
        tx.rollback().await?;
        return Err(DbError::NotFound(Missing::Forum(forum_slug.to_owned())));
    }
    let forum = forum_slug.to_owned();
    let author = match users::find_nickname(&mut tx, &new_thread.author).await? {
        Some(author) => author,
        None => {
            tx.rollback().await?;
            return Err(DbError::NotFound(Missing::User(new_thread.author)));
        },
    };
    let result = insert_returning_id(&mut tx, Query::insert()
        .into_table(Threads::Table)
        .columns([
            Threads::Slug,
            Threads::Title,
            Threads::Message,
            Threads::Author,
            Threads::ForumSlug,
            Threads::CreatedAt,
        ])
        .values_panic([
            slug.clone().into(),
            new_thread.title.as_str().into(),
            new_thread.message.as_str().into(),
            author.as_str().into(),
            forum.as_str().into(),
            format_timestamp(&created).into(),
        ])
        .returning_col(Threads::Id)).await;
    let id = match result {
        Ok(id) => id,
        Err(e) if e.is_unique_violation() => {
            tx.rollback().await?;
            let slug = slug.unwrap_or_default();
            debug!("thread '{}' already exists", slug);
            let thread = ThreadRef::Slug(slug);
            let mut conn = pool.acquire().await?;
            let existing = find_thread(&mut conn, &thread).await?
                .ok_or(DbError::NotFound(Missing::Thread(thread)))?;
            return Ok(Creation::Conflict(existing));
        },
        Err(e) => {
            tx.rollback().await?;
            return Err(e);
        },
    };
    forums::add_member(&mut tx, &forum, &author).await?;
    tx.commit().await?;
    info!("Created thread {} in forum '{}'", id, forum);
    Ok(Creation::Created(Thread {
        id,
        slug,
        title: new_thread.title,
        message: new_thread.message,
        author,
        forum,
        created,
        votes: 0,
    }))
}

pub async fn update_thread(pool: &Pool, thread: &ThreadRef, data: UpdateThread) -> Result<Thread, DbError> {
    let mut tx = pool.begin().await?;
    let key = match lock_thread(&mut tx, thread).await {
        Ok(key) => key,
        Err(e) => {
            tx.rollback().await?;
            return Err(e);
        },
    };
    let mut update = Query::update();
    update.table(Threads::Table)
        .and_where(Expr::col(Threads::Id).eq(key.id));
    let mut changed = false;
    if let Some(title) = data.title {
        update.value(Threads::Title, title);
        changed = true;
    }
    if let Some(message) = data.message {
        update.value(Threads::Message, message);
        changed = true;
    }
    if changed {
        execute(&mut tx, &update).await?;
    }
    let updated = find_thread(&mut tx, &ThreadRef::Id(key.id)).await?
        .ok_or_else(|| DbError::NotFound(Missing::Thread(thread.clone())))?;
    tx.commit().await?;
    Ok(updated)
}

/// Threads of a forum ordered by creation time. `since` is an inclusive
/// timestamp cursor, a `limit` of 0 is unbounded.
pub async fn get_threads(
    pool: &Pool,
    forum_slug: &str,
    limit: u64,
    since: Option<DateTime<Utc>>,
    desc: bool,
) -> Result<Vec<Thread>, DbError> {
    let mut conn = pool.acquire().await?;
    if forums::find_slug(&mut conn, forum_slug).await?.is_none() {
        return Err(DbError::NotFound(Missing::Forum(forum_slug.to_owned())));
    }
    let mut query = get_default_thread_query();
    query.and_where(Expr::col((Threads::Table, Threads::ForumSlug)).eq(forum_slug));
    if let Some(since) = since {
        let boundary = Expr::col((Threads::Table, Threads::CreatedAt));
        let since = format_timestamp(&since);
        query.and_where(if desc { boundary.lte(since) } else { boundary.gte(since) });
    }
    let order = if desc { Order::Desc } else { Order::Asc };
    query.order_by((Threads::Table, Threads::CreatedAt), order.clone())
        .order_by((Threads::Table, Threads::Id), order);
    if limit > 0 {
        query.limit(limit);
    }
    let rows = select(&mut conn, &query).await?;
    rows.iter().map(thread_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_address_a_thread_by_id() {
        assert_eq!(ThreadRef::parse("42").unwrap(), ThreadRef::Id(42));
        assert_eq!("007".parse::<ThreadRef>().unwrap(), ThreadRef::Id(7));
    }

    #[test]
    fn anything_else_is_a_slug() {
        assert_eq!(ThreadRef::parse("42-answers").unwrap(), ThreadRef::Slug("42-answers".to_owned()));
        assert_eq!(ThreadRef::parse("-1").unwrap(), ThreadRef::Slug("-1".to_owned()));
    }

    #[test]
    fn rejects_empty_and_oversized_refs() {
        assert!(matches!(ThreadRef::parse(""), Err(DbError::ValidationError(_))));
        assert!(matches!(ThreadRef::parse("99999999999999999999"), Err(DbError::ValidationError(_))));
    }
}
