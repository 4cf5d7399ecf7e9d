/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! DB queries related to users

use log::{debug, info};
use sea_query::{Cond, ConditionalStatement, Expr, Iden, Order, OrderedStatement, Query, SelectStatement};
use sqlx::Row;

use super::{Creation, DbConnection, DbError, DbRow, Missing, Pool, execute, select, select_optional};

#[derive(Iden)]
pub enum Users {
    Table,
    Nickname,
    Fullname,
    Email,
    About,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct User {
    pub nickname: String,
    pub fullname: String,
    pub email: String,
    pub about: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct NewUser {
    pub nickname: String,
    pub fullname: String,
    pub email: String,
    #[serde(default)]
    pub about: String,
}

/// Profile changes; `None` leaves a field as it is.
#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct UpdateUser {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub about: Option<String>,
}

pub(crate) fn get_default_user_query() -> SelectStatement {
    Query::select()
        .columns([
            (Users::Table, Users::Nickname),
            (Users::Table, Users::Fullname),
            (Users::Table, Users::Email),
            (Users::Table, Users::About),
        ])
        .from(Users::Table)
        .to_owned()
}

pub(crate) fn user_from_row(row: &DbRow) -> Result<User, DbError> {
    Ok(User {
        nickname: row.try_get("nickname")?,
        fullname: row.try_get("fullname")?,
        email: row.try_get("email")?,
        about: row.try_get("about")?,
    })
}

pub(crate) async fn query_users(conn: &mut DbConnection, query: &SelectStatement) -> Result<Vec<User>, DbError> {
    let rows = select(conn, query).await?;
    rows.iter().map(user_from_row).collect()
}

pub(crate) async fn find_user(conn: &mut DbConnection, nickname: &str) -> Result<Option<User>, DbError> {
    let row = select_optional(conn, get_default_user_query()
        .and_where(Expr::col((Users::Table, Users::Nickname)).eq(nickname))).await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Canonical nickname of an existing user.
pub(crate) async fn find_nickname(conn: &mut DbConnection, nickname: &str) -> Result<Option<String>, DbError> {
    let row = select_optional(conn, Query::select()
        .column(Users::Nickname)
        .from(Users::Table)
        .and_where(Expr::col(Users::Nickname).eq(nickname))).await?;
    Ok(match row {
        Some(row) => Some(row.try_get(0)?),
        None => None,
    })
}

pub async fn get_user(pool: &Pool, nickname: &str) -> Result<Option<User>, DbError> {
    let mut conn = pool.acquire().await?;
    find_user(&mut conn, nickname).await
}

/// Creates a user. When the nickname or the email is taken, every user
/// holding either of them is returned as the conflict.
pub async fn create_user(pool: &Pool, new_user: NewUser) -> Result<Creation<User, Vec<User>>, DbError> {
    let mut conn = pool.acquire().await?;
    let result = execute(&mut conn, Query::insert()
        .into_table(Users::Table)
        .columns([Users::Nickname, Users::Fullname, Users::Email, Users::About])
        .values_panic([
            new_user.nickname.as_str().into(),
            new_user.fullname.as_str().into(),
            new_user.email.as_str().into(),
            new_user.about.as_str().into(),
        ])).await;
    match result {
        Ok(_) => {
            info!("Created user '{}'", new_user.nickname);
            Ok(Creation::Created(User {
                nickname: new_user.nickname,
                fullname: new_user.fullname,
                email: new_user.email,
                about: new_user.about,
            }))
        },
        Err(e) if e.is_unique_violation() => {
            debug!("user '{}' or email '{}' already taken", new_user.nickname, new_user.email);
            let existing = query_users(&mut conn, get_default_user_query()
                .cond_where(Cond::any()
                    .add(Expr::col((Users::Table, Users::Nickname)).eq(new_user.nickname.as_str()))
                    .add(Expr::col((Users::Table, Users::Email)).eq(new_user.email.as_str())))
                .order_by((Users::Table, Users::Nickname), Order::Asc)).await?;
            Ok(Creation::Conflict(existing))
        },
        Err(e) => Err(e),
    }
}

pub async fn update_user(pool: &Pool, nickname: &str, data: UpdateUser) -> Result<User, DbError> {
    let mut tx = pool.begin().await?;
    let mut update = Query::update();
    update.table(Users::Table)
        .and_where(Expr::col(Users::Nickname).eq(nickname));
    let mut changed = false;
    if let Some(fullname) = data.fullname {
        update.value(Users::Fullname, fullname);
        changed = true;
    }
    if let Some(email) = data.email.as_ref() {
        update.value(Users::Email, email.as_str());
        changed = true;
    }
    if let Some(about) = data.about {
        update.value(Users::About, about);
        changed = true;
    }
    if changed {
        match execute(&mut tx, &update).await {
            Ok(_) => {},
            Err(e) if e.is_unique_violation() => {
                tx.rollback().await?;
                return Err(DbError::AlreadyExists {
                    entity: "user with email",
                    key: data.email.unwrap_or_default(),
                });
            },
            Err(e) => return Err(e),
        }
    }
    let user = find_user(&mut tx, nickname).await?;
    match user {
        Some(user) => {
            tx.commit().await?;
            Ok(user)
        },
        None => {
            tx.rollback().await?;
            Err(DbError::NotFound(Missing::User(nickname.to_owned())))
        },
    }
}
