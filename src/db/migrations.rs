/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Minimal migration system

#[cfg(not(feature = "postgres"))]
pub static MIGRATIONS: &[(&str, &[&str])] = &[
    ("V1_Init", &[
     "create table users (
         nickname text(100) primary key,
         fullname text(200) not null,
         email text(200) not null unique,
         about text not null default ''
     )",
     "create table forums (
         slug text(100) primary key,
         title text(200) not null,
         owner_nickname text(100) not null references users (nickname),
         post_count integer not null default 0,
         thread_count integer not null default 0
     )",
     "create table threads (
         id integer primary key autoincrement,
         slug text(100) null unique,
         title text(200) not null,
         message text not null,
         author text(100) not null references users (nickname),
         forum_slug text(100) not null references forums (slug),
         created_at text not null,
         votes integer not null default 0
     )",
     "create index threads_forum_created on threads (forum_slug, created_at, id)",
     "create table posts (
         id integer primary key autoincrement,
         created_at text not null,
         message text not null,
         edited boolean not null default 0,
         parent_id integer not null default 0,
         root_id integer not null default 0,
         path text not null,
         author text(100) not null references users (nickname),
         forum_slug text(100) not null references forums (slug),
         thread_id integer not null references threads (id)
     )",
     "create index posts_thread_id on posts (thread_id, id)",
     "create index posts_thread_path on posts (thread_id, path)",
     "create index posts_thread_root on posts (thread_id, root_id, path)",
     "create index posts_thread_parent on posts (thread_id, parent_id, id)",
     "create table votes (
         thread_id integer not null references threads (id),
         nickname text(100) not null references users (nickname),
         ballot integer not null,
         primary key (thread_id, nickname)
     )",
     "create table forum_members (
         forum_slug text(100) not null references forums (slug),
         nickname text(100) not null references users (nickname),
         primary key (forum_slug, nickname)
     )",
    ]),
];

#[cfg(feature = "postgres")]
pub static MIGRATIONS: &[(&str, &[&str])] = &[
    ("V1_Init", &[
     "create table users (
         nickname varchar(100) collate \"C\" primary key,
         fullname varchar(200) not null,
         email varchar(200) not null unique,
         about text not null default ''
     )",
     "create table forums (
         slug varchar(100) primary key,
         title varchar(200) not null,
         owner_nickname varchar(100) not null references users (nickname),
         post_count bigint not null default 0,
         thread_count bigint not null default 0
     )",
     "create table threads (
         id bigserial primary key,
         slug varchar(100) null unique,
         title varchar(200) not null,
         message text not null,
         author varchar(100) not null references users (nickname),
         forum_slug varchar(100) not null references forums (slug),
         created_at varchar(40) collate \"C\" not null,
         votes bigint not null default 0
     )",
     "create index threads_forum_created on threads (forum_slug, created_at, id)",
     "create table posts (
         id bigserial primary key,
         created_at varchar(40) collate \"C\" not null,
         message text not null,
         edited boolean not null default false,
         parent_id bigint not null default 0,
         root_id bigint not null default 0,
         path text collate \"C\" not null,
         author varchar(100) not null references users (nickname),
         forum_slug varchar(100) not null references forums (slug),
         thread_id bigint not null references threads (id)
     )",
     "create index posts_thread_id on posts (thread_id, id)",
     "create index posts_thread_path on posts (thread_id, path)",
     "create index posts_thread_root on posts (thread_id, root_id, path)",
     "create index posts_thread_parent on posts (thread_id, parent_id, id)",
     "create table votes (
         thread_id bigint not null references threads (id),
         nickname varchar(100) not null references users (nickname),
         ballot integer not null,
         primary key (thread_id, nickname)
     )",
     "create table forum_members (
         forum_slug varchar(100) not null references forums (slug),
         nickname varchar(100) not null references users (nickname),
         primary key (forum_slug, nickname)
     )",
    ]),
];
