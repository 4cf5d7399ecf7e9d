#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use forumtree::db::{
    self, Creation, Pool,
    forums::{self, Forum, NewForum},
    posts::{self, NewPost, Post},
    threads::{self, NewThread, Thread, ThreadRef},
    users::{self, NewUser, User},
};
use forumtree::settings::Settings;
use tempfile::TempDir;

/// Installs a fresh database in a temporary directory. The directory must
/// outlive the pool.
pub async fn install() -> (TempDir, Pool) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let settings = Settings {
        database: format!("sqlite:{}", dir.path().join("forum.db").display()),
        max_connections: 4,
        busy_timeout_ms: 30_000,
        operation_timeout_ms: 30_000,
    };
    let pool = db::install(&settings).await.expect("install database");
    (dir, pool)
}

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, hour, 0, 0).unwrap()
}

pub async fn create_user(pool: &Pool, nickname: &str) -> User {
    let creation = users::create_user(pool, NewUser {
        nickname: nickname.to_owned(),
        fullname: format!("{} Example", nickname),
        email: format!("{}@example.com", nickname),
        about: String::new(),
    }).await.expect("create user");
    match creation {
        Creation::Created(user) => user,
        Creation::Conflict(_) => panic!("user {} already exists", nickname),
    }
}

pub async fn create_forum(pool: &Pool, slug: &str, owner: &str) -> Forum {
    forums::create_forum(pool, NewForum {
        slug: slug.to_owned(),
        title: format!("Forum {}", slug),
        user: owner.to_owned(),
    }).await.expect("create forum").into_inner()
}

pub async fn create_thread(pool: &Pool, forum: &str, slug: &str, author: &str) -> Thread {
    threads::create_thread(pool, forum, NewThread {
        slug: Some(slug.to_owned()),
        title: format!("Thread {}", slug),
        message: "first!".to_owned(),
        author: author.to_owned(),
        created: Some(at(12)),
    }).await.expect("create thread").into_inner()
}

pub fn new_post(author: &str, parent: i64) -> NewPost {
    NewPost {
        author: author.to_owned(),
        message: format!("reply to {}", parent),
        parent,
    }
}

pub async fn reply(pool: &Pool, thread: &Thread, author: &str, parent: i64) -> Post {
    let mut created = posts::create_posts(pool, &ThreadRef::Id(thread.id), at(13), vec![new_post(author, parent)])
        .await
        .expect("create post");
    created.remove(0)
}

/// A user, a forum and a thread to post in.
pub async fn seed(pool: &Pool) -> Thread {
    create_user(pool, "alice").await;
    create_forum(pool, "pirates", "alice").await;
    create_thread(pool, "pirates", "treasure", "alice").await
}

pub fn ids(posts: &[Post]) -> Vec<i64> {
    posts.iter().map(|p| p.id).collect()
}
