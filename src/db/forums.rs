/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! DB queries related to forums and their members

use log::{debug, info};
use sea_query::{ConditionalStatement, Expr, Iden, OnConflict, Order, OrderedStatement, Query, SelectStatement};
use sqlx::Row;

use super::{
    Creation, DbConnection, DbError, DbRow, Missing, Pool, execute, select_optional,
    users::{self, User, Users},
};

#[derive(Iden)]
pub enum Forums {
    Table,
    Slug,
    Title,
    OwnerNickname,
    PostCount,
    ThreadCount,
}

#[derive(Iden)]
pub enum ForumMembers {
    Table,
    ForumSlug,
    Nickname,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Forum {
    pub slug: String,
    pub title: String,
    pub user: String,
    pub posts: i64,
    pub threads: i64,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct NewForum {
    pub slug: String,
    pub title: String,
    pub user: String,
}

fn get_default_forum_query() -> SelectStatement {
    Query::select()
        .columns([
            Forums::Slug,
            Forums::Title,
            Forums::OwnerNickname,
            Forums::PostCount,
            Forums::ThreadCount,
        ])
        .from(Forums::Table)
        .to_owned()
}

fn forum_from_row(row: &DbRow) -> Result<Forum, DbError> {
    Ok(Forum {
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        user: row.try_get("owner_nickname")?,
        posts: row.try_get("post_count")?,
        threads: row.try_get("thread_count")?,
    })
}

pub(crate) async fn find_forum(conn: &mut DbConnection, slug: &str) -> Result<Option<Forum>, DbError> {
    let row = select_optional(conn, get_default_forum_query()
        .and_where(Expr::col(Forums::Slug).eq(slug))).await?;
    row.as_ref().map(forum_from_row).transpose()
}

/// Canonical slug of an existing forum.
pub(crate) async fn find_slug(conn: &mut DbConnection, slug: &str) -> Result<Option<String>, DbError> {
    let row = select_optional(conn, Query::select()
        .column(Forums::Slug)
        .from(Forums::Table)
        .and_where(Expr::col(Forums::Slug).eq(slug))).await?;
    Ok(match row {
        Some(row) => Some(row.try_get(0)?),
        None => None,
    })
}

pub async fn get_forum(pool: &Pool, slug: &str) -> Result<Option<Forum>, DbError> {
    let mut conn = pool.acquire().await?;
    find_forum(&mut conn, slug).await
}

/// Creates a forum. The insert is the first statement of the transaction, so
/// concurrent creators queue on the write lock; a missing owner surfaces as a
/// foreign key violation.
pub async fn create_forum(pool: &Pool, new_forum: NewForum) -> Result<Creation<Forum>, DbError> {
    let mut tx = pool.begin().await?;
    let result = execute(&mut tx, Query::insert()
        .into_table(Forums::Table)
        .columns([Forums::Slug, Forums::Title, Forums::OwnerNickname])
        .values_panic([
            new_forum.slug.as_str().into(),
            new_forum.title.as_str().into(),
            new_forum.user.as_str().into(),
        ])).await;
    match result {
        Ok(_) => {
            tx.commit().await?;
            info!("Created forum '{}' owned by '{}'", new_forum.slug, new_forum.user);
            Ok(Creation::Created(Forum {
                slug: new_forum.slug,
                title: new_forum.title,
                user: new_forum.user,
                posts: 0,
                threads: 0,
            }))
        },
        Err(e) if e.is_foreign_key_violation() => {
            tx.rollback().await?;
            Err(DbError::NotFound(Missing::User(new_forum.user)))
        },
        Err(e) if e.is_unique_violation() => {
            tx.rollback().await?;
            debug!("forum '{}' already exists", new_forum.slug);
            let mut conn = pool.acquire().await?;
            let existing = find_forum(&mut conn, &new_forum.slug).await?
                .ok_or_else(|| DbError::NotFound(Missing::Forum(new_forum.slug.clone())))?;
            Ok(Creation::Conflict(existing))
        },
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        },
    }
}

/// Records that a user took part in a forum. Repeated calls are no-ops.
pub(crate) async fn add_member(conn: &mut DbConnection, forum_slug: &str, nickname: &str) -> Result<(), DbError> {
    execute(conn, Query::insert()
        .into_table(ForumMembers::Table)
        .columns([ForumMembers::ForumSlug, ForumMembers::Nickname])
        .values_panic([forum_slug.into(), nickname.into()])
        .on_conflict(OnConflict::columns([ForumMembers::ForumSlug, ForumMembers::Nickname])
            .do_nothing()
            .to_owned())).await?;
    Ok(())
}

pub(crate) async fn increment_post_count(conn: &mut DbConnection, forum_slug: &str, amount: i64) -> Result<(), DbError> {
    execute(conn, Query::update()
        .table(Forums::Table)
        .value(Forums::PostCount, Expr::col(Forums::PostCount).add(amount))
        .and_where(Expr::col(Forums::Slug).eq(forum_slug))).await?;
    Ok(())
}

/// Counts a new thread and takes the write lock on the forum row. False when
/// the forum does not exist.
pub(crate) async fn increment_thread_count(conn: &mut DbConnection, forum_slug: &str) -> Result<bool, DbError> {
    let updated = execute(conn, Query::update()
        .table(Forums::Table)
        .value(Forums::ThreadCount, Expr::col(Forums::ThreadCount).add(1))
        .and_where(Expr::col(Forums::Slug).eq(forum_slug))).await?;
    Ok(updated > 0)
}

/// Users who created a thread or a post in the forum, ordered by nickname.
/// `since` is an exclusive nickname cursor, a `limit` of 0 is unbounded.
pub async fn get_forum_users(
    pool: &Pool,
    slug: &str,
    limit: u64,
    since: Option<&str>,
    desc: bool,
) -> Result<Vec<User>, DbError> {
    let mut conn = pool.acquire().await?;
    if find_slug(&mut conn, slug).await?.is_none() {
        return Err(DbError::NotFound(Missing::Forum(slug.to_owned())));
    }
    let mut query = users::get_default_user_query();
    query.inner_join(ForumMembers::Table, Expr::col((ForumMembers::Table, ForumMembers::Nickname))
            .equals((Users::Table, Users::Nickname)))
        .and_where(Expr::col((ForumMembers::Table, ForumMembers::ForumSlug)).eq(slug));
    if let Some(since) = since {
        let boundary = Expr::col((Users::Table, Users::Nickname));
        query.and_where(if desc { boundary.lt(since) } else { boundary.gt(since) });
    }
    query.order_by((Users::Table, Users::Nickname), if desc { Order::Desc } else { Order::Asc });
    if limit > 0 {
        query.limit(limit);
    }
    users::query_users(&mut conn, &query).await
}
