/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! DB queries related to posts
//!
//! Every post stores its materialized path (see [`crate::path`]) and the id
//! of its root ancestor. Posts are written in input order within a batch, so
//! ids and therefore paths respect creation order, which the `tree` and
//! `parent_tree` listings rely on.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_query::{ConditionalStatement, Expr, Iden, Order, OrderedStatement, Query, SelectStatement};
use sqlx::Row;

use crate::path::PostPath;

use super::{
    DbConnection, DbError, DbRow, Missing, Pool, execute, format_timestamp, insert_returning_id,
    parse_timestamp, select, select_optional,
    forums::{self, Forum},
    threads::{self, Thread, ThreadRef},
    users::{self, User},
};

#[derive(Iden)]
pub enum Posts {
    Table,
    Id,
    CreatedAt,
    Message,
    Edited,
    ParentId,
    RootId,
    Path,
    Author,
    ForumSlug,
    ThreadId,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub parent: i64,
    pub author: String,
    pub message: String,
    pub is_edited: bool,
    pub forum: String,
    pub thread: i64,
    pub created: DateTime<Utc>,
    #[serde(skip)]
    pub path: PostPath,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct NewPost {
    pub author: String,
    pub message: String,
    /// Id of the post replied to, 0 for a root post.
    #[serde(default)]
    pub parent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// By id, ignoring the reply structure.
    Flat,
    /// Depth-first by path.
    Tree,
    /// Pages over root posts, each followed by its whole subtree.
    ParentTree,
}

impl SortMode {
    /// Unrecognized modes fall back to `Flat`.
    pub fn parse(mode: &str) -> SortMode {
        match mode {
            "tree" => SortMode::Tree,
            "parent_tree" => SortMode::ParentTree,
            _ => SortMode::Flat,
        }
    }
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Flat
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostQuery {
    /// Page size, 0 for no limit. In `ParentTree` mode this counts root posts.
    pub limit: u64,
    /// Id of the last post seen, 0 to start from the beginning.
    pub since: i64,
    pub sort: SortMode,
    pub desc: bool,
}

impl PostQuery {
    fn order(&self) -> Order {
        if self.desc {
            Order::Desc
        } else {
            Order::Asc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Related {
    User,
    Forum,
    Thread,
}

impl Related {
    pub fn parse(related: &str) -> Option<Related> {
        match related {
            "user" => Some(Related::User),
            "forum" => Some(Related::Forum),
            "thread" => Some(Related::Thread),
            _ => None,
        }
    }
}

#[derive(serde::Serialize, Debug, Clone)]
pub struct PostDetails {
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum: Option<Forum>,
}

fn get_default_post_query() -> SelectStatement {
    Query::select()
        .columns([
            (Posts::Table, Posts::Id),
            (Posts::Table, Posts::CreatedAt),
            (Posts::Table, Posts::Message),
            (Posts::Table, Posts::Edited),
            (Posts::Table, Posts::ParentId),
            (Posts::Table, Posts::Path),
            (Posts::Table, Posts::Author),
            (Posts::Table, Posts::ForumSlug),
            (Posts::Table, Posts::ThreadId),
        ])
        .from(Posts::Table)
        .to_owned()
}

fn post_from_row(row: &DbRow) -> Result<Post, DbError> {
    let created: String = row.try_get("created_at")?;
    let path: String = row.try_get("path")?;
    Ok(Post {
        id: row.try_get("id")?,
        parent: row.try_get("parent_id")?,
        author: row.try_get("author")?,
        message: row.try_get("message")?,
        is_edited: row.try_get("edited")?,
        forum: row.try_get("forum_slug")?,
        thread: row.try_get("thread_id")?,
        created: parse_timestamp(&created)?,
        path: PostPath::decode(&path)?,
    })
}

async fn query_posts(conn: &mut DbConnection, query: &SelectStatement) -> Result<Vec<Post>, DbError> {
    let rows = select(conn, query).await?;
    rows.iter().map(post_from_row).collect()
}

async fn find_post(conn: &mut DbConnection, id: i64) -> Result<Option<Post>, DbError> {
    let row = select_optional(conn, get_default_post_query()
        .and_where(Expr::col((Posts::Table, Posts::Id)).eq(id))).await?;
    row.as_ref().map(post_from_row).transpose()
}

/// Path of a post, provided it belongs to the given thread.
async fn find_path(conn: &mut DbConnection, thread_id: i64, id: i64) -> Result<Option<PostPath>, DbError> {
    let row = select_optional(conn, Query::select()
        .column(Posts::Path)
        .from(Posts::Table)
        .and_where(Expr::col(Posts::Id).eq(id))
        .and_where(Expr::col(Posts::ThreadId).eq(thread_id))).await?;
    match row {
        Some(row) => {
            let path: String = row.try_get(0)?;
            Ok(Some(PostPath::decode(&path)?))
        },
        None => Ok(None),
    }
}

/// Creates a batch of posts in a thread. Either every post is created or,
/// on the first failure, none is.
pub async fn create_posts(
    pool: &Pool,
    thread: &ThreadRef,
    created: DateTime<Utc>,
    posts: Vec<NewPost>,
) -> Result<Vec<Post>, DbError> {
    let created = parse_timestamp(&format_timestamp(&created))?;
    let mut tx = pool.begin().await?;
    match insert_posts(&mut tx, thread, &created, posts).await {
        Ok(posts) => {
            tx.commit().await?;
            info!("Created {} posts in thread {}", posts.len(), thread);
            Ok(posts)
        },
        Err(e) => {
            tx.rollback().await?;
            debug!("post batch for thread {} rolled back: {}", thread, e);
            Err(e)
        },
    }
}

/// Rows are inserted with a placeholder path that is filled in once the
/// store has assigned the post id.
async fn insert_posts(
    conn: &mut DbConnection,
    thread: &ThreadRef,
    created: &DateTime<Utc>,
    posts: Vec<NewPost>,
) -> Result<Vec<Post>, DbError> {
    let key = threads::lock_thread(conn, thread).await?;
    let created_at = format_timestamp(created);
    // requested nickname -> stored nickname
    let mut authors: HashMap<String, String> = HashMap::new();
    let mut members: Vec<String> = Vec::new();
    let mut result = Vec::with_capacity(posts.len());
    for new_post in posts {
        let author = match authors.get(&new_post.author) {
            Some(author) => author.clone(),
            None => {
                let author = users::find_nickname(conn, &new_post.author).await?
                    .ok_or_else(|| DbError::UnknownAuthor(new_post.author.clone()))?;
                authors.insert(new_post.author.clone(), author.clone());
                if !members.contains(&author) {
                    members.push(author.clone());
                }
                author
            },
        };
        let parent_path = if new_post.parent == 0 {
            None
        } else {
            let path = find_path(conn, key.id, new_post.parent).await?
                .ok_or(DbError::CrossThreadParent { parent: new_post.parent })?;
            Some(path)
        };
        let id = insert_returning_id(conn, Query::insert()
            .into_table(Posts::Table)
            .columns([
                Posts::CreatedAt,
                Posts::Message,
                Posts::Edited,
                Posts::ParentId,
                Posts::RootId,
                Posts::Path,
                Posts::Author,
                Posts::ForumSlug,
                Posts::ThreadId,
            ])
            .values_panic([
                created_at.as_str().into(),
                new_post.message.as_str().into(),
                false.into(),
                new_post.parent.into(),
                0i64.into(),
                "".into(),
                author.as_str().into(),
                key.forum.as_str().into(),
                key.id.into(),
            ])
            .returning_col(Posts::Id)).await?;
        let path = match parent_path {
            Some(parent_path) => parent_path.child(id),
            None => PostPath::root(id),
        };
        execute(conn, Query::update()
            .table(Posts::Table)
            .value(Posts::Path, path.encode())
            .value(Posts::RootId, path.root_id())
            .and_where(Expr::col(Posts::Id).eq(id))).await?;
        result.push(Post {
            id,
            parent: new_post.parent,
            author,
            message: new_post.message,
            is_edited: false,
            forum: key.forum.clone(),
            thread: key.id,
            created: *created,
            path,
        });
    }
    if !result.is_empty() {
        forums::increment_post_count(conn, &key.forum, result.len() as i64).await?;
        for member in &members {
            forums::add_member(conn, &key.forum, member).await?;
        }
    }
    Ok(result)
}

fn flat_query(thread_id: i64, query: &PostQuery) -> SelectStatement {
    let mut select = get_default_post_query();
    select.and_where(Expr::col((Posts::Table, Posts::ThreadId)).eq(thread_id));
    if query.since != 0 {
        let boundary = Expr::col((Posts::Table, Posts::Id));
        select.and_where(if query.desc { boundary.lt(query.since) } else { boundary.gt(query.since) });
    }
    select.order_by((Posts::Table, Posts::Id), query.order());
    if query.limit > 0 {
        select.limit(query.limit);
    }
    select
}

fn tree_query(thread_id: i64, query: &PostQuery, cursor: Option<&PostPath>) -> SelectStatement {
    let mut select = get_default_post_query();
    select.and_where(Expr::col((Posts::Table, Posts::ThreadId)).eq(thread_id));
    if let Some(cursor) = cursor {
        let boundary = Expr::col((Posts::Table, Posts::Path));
        let cursor = cursor.encode();
        select.and_where(if query.desc { boundary.lt(cursor) } else { boundary.gt(cursor) });
    }
    select.order_by((Posts::Table, Posts::Path), query.order());
    if query.limit > 0 {
        select.limit(query.limit);
    }
    select
}

fn parent_tree_query(thread_id: i64, query: &PostQuery, cursor: Option<&PostPath>) -> SelectStatement {
    let mut roots = Query::select();
    roots.column(Posts::Id)
        .from(Posts::Table)
        .and_where(Expr::col(Posts::ThreadId).eq(thread_id))
        .and_where(Expr::col(Posts::ParentId).eq(0));
    if let Some(cursor) = cursor {
        let boundary = Expr::col(Posts::Id);
        roots.and_where(if query.desc { boundary.lt(cursor.root_id()) } else { boundary.gt(cursor.root_id()) });
    }
    roots.order_by(Posts::Id, query.order());
    if query.limit > 0 {
        roots.limit(query.limit);
    }
    let mut select = get_default_post_query();
    select.and_where(Expr::col((Posts::Table, Posts::ThreadId)).eq(thread_id))
        .and_where(Expr::col((Posts::Table, Posts::RootId)).in_subquery(roots))
        .order_by((Posts::Table, Posts::RootId), query.order())
        .order_by((Posts::Table, Posts::Path), Order::Asc);
    select
}

/// Lists the posts of a thread. An existing thread without posts, or a
/// cursor that is not a post of the thread, gives an empty page.
pub async fn get_posts(pool: &Pool, thread: &ThreadRef, query: &PostQuery) -> Result<Vec<Post>, DbError> {
    let mut tx = pool.begin().await?;
    let thread_id = match threads::find_thread_id(&mut tx, thread).await? {
        Some(id) => id,
        None => {
            tx.rollback().await?;
            return Err(DbError::NotFound(Missing::Thread(thread.clone())));
        },
    };
    let cursor = if query.since != 0 && query.sort != SortMode::Flat {
        match find_path(&mut tx, thread_id, query.since).await? {
            Some(path) => Some(path),
            None => {
                debug!("cursor {} is not a post of thread {}", query.since, thread_id);
                tx.commit().await?;
                return Ok(Vec::new());
            },
        }
    } else {
        None
    };
    debug!("listing posts of thread {} with {:?}", thread_id, query);
    let select = match query.sort {
        SortMode::Flat => flat_query(thread_id, query),
        SortMode::Tree => tree_query(thread_id, query, cursor.as_ref()),
        SortMode::ParentTree => parent_tree_query(thread_id, query, cursor.as_ref()),
    };
    let posts = query_posts(&mut tx, &select).await?;
    tx.commit().await?;
    Ok(posts)
}

pub async fn get_post(pool: &Pool, id: i64) -> Result<Option<Post>, DbError> {
    let mut conn = pool.acquire().await?;
    find_post(&mut conn, id).await
}

pub async fn get_post_details(pool: &Pool, id: i64, related: &[Related]) -> Result<PostDetails, DbError> {
    let mut tx = pool.begin().await?;
    let post = find_post(&mut tx, id).await?
        .ok_or(DbError::NotFound(Missing::Post(id)))?;
    let mut details = PostDetails {
        post,
        author: None,
        thread: None,
        forum: None,
    };
    for related in related {
        match related {
            Related::User => {
                details.author = users::find_user(&mut tx, &details.post.author).await?;
            },
            Related::Forum => {
                details.forum = forums::find_forum(&mut tx, &details.post.forum).await?;
            },
            Related::Thread => {
                details.thread = threads::find_thread(&mut tx, &ThreadRef::Id(details.post.thread)).await?;
            },
        }
    }
    tx.commit().await?;
    Ok(details)
}

/// Changes the message of a post. The post is marked as edited only when the
/// message actually changes.
pub async fn update_post(pool: &Pool, id: i64, message: Option<String>) -> Result<Post, DbError> {
    let mut tx = pool.begin().await?;
    if let Some(message) = message {
        execute(&mut tx, Query::update()
            .table(Posts::Table)
            .value(Posts::Message, message.as_str())
            .value(Posts::Edited, true)
            .and_where(Expr::col(Posts::Id).eq(id))
            .and_where(Expr::col(Posts::Message).ne(message.as_str()))).await?;
    }
    match find_post(&mut tx, id).await? {
        Some(post) => {
            tx.commit().await?;
            Ok(post)
        },
        None => {
            tx.rollback().await?;
            Err(DbError::NotFound(Missing::Post(id)))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sort_falls_back_to_flat() {
        assert_eq!(SortMode::parse("tree"), SortMode::Tree);
        assert_eq!(SortMode::parse("parent_tree"), SortMode::ParentTree);
        assert_eq!(SortMode::parse("flat"), SortMode::Flat);
        assert_eq!(SortMode::parse("sideways"), SortMode::Flat);
        assert_eq!(SortMode::default(), SortMode::Flat);
    }

    #[test]
    fn parses_related_records() {
        assert_eq!(Related::parse("user"), Some(Related::User));
        assert_eq!(Related::parse("thread"), Some(Related::Thread));
        assert_eq!(Related::parse("votes"), None);
    }
}
