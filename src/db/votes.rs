/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! DB queries related to thread votes

use log::debug;
use sea_query::{ConditionalStatement, Expr, Iden, OnConflict, Query};
use sqlx::Row;

use super::{
    DbConnection, DbError, Missing, Pool, execute, select_optional,
    threads::{self, Thread, ThreadKey, ThreadRef, Threads},
    users,
};

#[derive(Iden)]
pub enum Votes {
    Table,
    ThreadId,
    Nickname,
    Ballot,
}

/// A user's current vote on a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ballot {
    Up,
    Down,
}

impl Ballot {
    pub fn voice(self) -> i32 {
        match self {
            Ballot::Up => 1,
            Ballot::Down => -1,
        }
    }

    /// Change of the thread tally when a user whose recorded ballot is
    /// `previous` casts `self`.
    pub fn delta(self, previous: Option<Ballot>) -> i64 {
        match (previous, self) {
            (None, ballot) => ballot.voice() as i64,
            (Some(previous), ballot) if previous == ballot => 0,
            (Some(_), ballot) => 2 * ballot.voice() as i64,
        }
    }
}

impl TryFrom<i32> for Ballot {
    type Error = DbError;

    fn try_from(voice: i32) -> Result<Self, Self::Error> {
        match voice {
            1 => Ok(Ballot::Up),
            -1 => Ok(Ballot::Down),
            _ => Err(DbError::ValidationError(format!("voice must be 1 or -1, got {}", voice))),
        }
    }
}

async fn find_ballot(conn: &mut DbConnection, thread_id: i64, nickname: &str) -> Result<Option<Ballot>, DbError> {
    let row = select_optional(conn, Query::select()
        .column(Votes::Ballot)
        .from(Votes::Table)
        .and_where(Expr::col(Votes::ThreadId).eq(thread_id))
        .and_where(Expr::col(Votes::Nickname).eq(nickname))).await?;
    match row {
        Some(row) => {
            let voice: i32 = row.try_get(0)?;
            Ok(Some(Ballot::try_from(voice).map_err(|_| DbError::ColumnTypeError)?))
        },
        None => Ok(None),
    }
}

async fn record_vote(conn: &mut DbConnection, thread: &ThreadRef, nickname: &str, ballot: Ballot) -> Result<Thread, DbError> {
    let ThreadKey { id, .. } = threads::lock_thread(conn, thread).await?;
    let voter = users::find_nickname(conn, nickname).await?
        .ok_or_else(|| DbError::NotFound(Missing::User(nickname.to_owned())))?;
    let previous = find_ballot(conn, id, &voter).await?;
    execute(conn, Query::insert()
        .into_table(Votes::Table)
        .columns([Votes::ThreadId, Votes::Nickname, Votes::Ballot])
        .values_panic([id.into(), voter.as_str().into(), ballot.voice().into()])
        .on_conflict(OnConflict::columns([Votes::ThreadId, Votes::Nickname])
            .update_column(Votes::Ballot)
            .to_owned())).await?;
    let delta = ballot.delta(previous);
    debug!("vote by '{}' on thread {}: {:?} -> {:?} ({:+})", voter, id, previous, ballot, delta);
    if delta != 0 {
        execute(conn, Query::update()
            .table(Threads::Table)
            .value(Threads::Votes, Expr::col(Threads::Votes).add(delta))
            .and_where(Expr::col(Threads::Id).eq(id))).await?;
    }
    threads::find_thread(conn, &ThreadRef::Id(id)).await?
        .ok_or_else(|| DbError::NotFound(Missing::Thread(thread.clone())))
}

/// Casts a vote of +1 or -1 on a thread. Repeating a ballot leaves the
/// tally unchanged; switching it moves the tally by two.
pub async fn cast_vote(pool: &Pool, thread: &ThreadRef, nickname: &str, voice: i32) -> Result<Thread, DbError> {
    let ballot = Ballot::try_from(voice)?;
    let mut tx = pool.begin().await?;
    match record_vote(&mut tx, thread, nickname, ballot).await {
        Ok(thread) => {
            tx.commit().await?;
            Ok(thread)
        },
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        },
    }
}
