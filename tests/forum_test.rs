mod common;

use common::{at, create_forum, create_thread, create_user, install, reply, seed};
use forumtree::db::{
    self, Creation, DbError, Missing,
    forums::{self, NewForum},
    threads::{self, NewThread, ThreadRef, UpdateThread},
    users::{self, NewUser, UpdateUser},
};
use futures::future::join_all;

fn new_thread(slug: Option<&str>, author: &str, hour: u32) -> NewThread {
    NewThread {
        slug: slug.map(str::to_owned),
        title: "Where is the gold?".to_owned(),
        message: "Somewhere".to_owned(),
        author: author.to_owned(),
        created: Some(at(hour)),
    }
}

#[async_std::test]
async fn user_conflicts_list_every_clashing_user() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;
    create_user(&pool, "bob").await;

    let creation = users::create_user(&pool, NewUser {
        nickname: "alice".to_owned(),
        fullname: "Someone Else".to_owned(),
        email: "bob@example.com".to_owned(),
        about: String::new(),
    }).await.unwrap();
    match creation {
        Creation::Conflict(users) => {
            let nicknames: Vec<&str> = users.iter().map(|u| u.nickname.as_str()).collect();
            assert_eq!(nicknames, vec!["alice", "bob"]);
        },
        Creation::Created(_) => panic!("duplicate user created"),
    }
    assert_eq!(db::status(&pool).await.unwrap().user, 2);
}

#[async_std::test]
async fn updates_user_profile() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;
    create_user(&pool, "bob").await;

    let updated = users::update_user(&pool, "alice", UpdateUser {
        about: Some("Captain".to_owned()),
        ..Default::default()
    }).await.unwrap();
    assert_eq!(updated.about, "Captain");
    assert_eq!(updated.email, "alice@example.com");

    let unchanged = users::update_user(&pool, "alice", UpdateUser::default()).await.unwrap();
    assert_eq!(unchanged, updated);

    let result = users::update_user(&pool, "alice", UpdateUser {
        email: Some("bob@example.com".to_owned()),
        ..Default::default()
    }).await;
    assert!(matches!(result, Err(DbError::AlreadyExists { .. })));

    let result = users::update_user(&pool, "ghost", UpdateUser::default()).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::User(_)))));
    assert_eq!(users::get_user(&pool, "alice").await.unwrap().unwrap(), updated);
}

#[async_std::test]
async fn forum_conflict_returns_existing_forum() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;
    create_user(&pool, "bob").await;
    let forum = create_forum(&pool, "pirates", "alice").await;
    assert_eq!((forum.posts, forum.threads), (0, 0));

    let creation = forums::create_forum(&pool, NewForum {
        slug: "pirates".to_owned(),
        title: "Other pirates".to_owned(),
        user: "bob".to_owned(),
    }).await.unwrap();
    assert!(creation.is_conflict());
    assert_eq!(creation.into_inner(), forum);

    let result = forums::create_forum(&pool, NewForum {
        slug: "ninjas".to_owned(),
        title: "Ninjas".to_owned(),
        user: "ghost".to_owned(),
    }).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::User(_)))));
    assert_eq!(db::status(&pool).await.unwrap().forum, 1);
}

#[async_std::test]
async fn thread_slug_conflicts() {
    let (_dir, pool) = install().await;
    let thread = seed(&pool).await;

    let creation = threads::create_thread(&pool, "pirates", new_thread(Some("treasure"), "alice", 15)).await.unwrap();
    assert!(creation.is_conflict());
    assert_eq!(creation.into_inner(), thread);

    let first = threads::create_thread(&pool, "pirates", new_thread(None, "alice", 15)).await.unwrap();
    let second = threads::create_thread(&pool, "pirates", new_thread(None, "alice", 16)).await.unwrap();
    assert!(!first.is_conflict() && !second.is_conflict());
    assert_eq!(first.into_inner().slug, None);

    let forum = forums::get_forum(&pool, "pirates").await.unwrap().unwrap();
    assert_eq!(forum.threads, 3);
}

#[async_std::test]
async fn thread_needs_author_and_forum() {
    let (_dir, pool) = install().await;
    seed(&pool).await;

    let result = threads::create_thread(&pool, "pirates", new_thread(Some("x"), "ghost", 15)).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::User(_)))));
    let result = threads::create_thread(&pool, "ninjas", new_thread(Some("x"), "alice", 15)).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::Forum(_)))));

    let forum = forums::get_forum(&pool, "pirates").await.unwrap().unwrap();
    assert_eq!(forum.threads, 1);
    assert_eq!(db::status(&pool).await.unwrap().thread, 1);
}

#[async_std::test]
async fn concurrent_threads_are_all_created() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;
    create_forum(&pool, "pirates", "alice").await;
    let slugs: Vec<String> = (0..8).map(|i| format!("s{}", i)).collect();

    let results = join_all(slugs.iter()
        .map(|slug| threads::create_thread(&pool, "pirates", new_thread(Some(slug.as_str()), "alice", 15)))).await;
    for result in results {
        assert!(!result.unwrap().is_conflict());
    }

    let forum = forums::get_forum(&pool, "pirates").await.unwrap().unwrap();
    assert_eq!(forum.threads, 8);
    assert_eq!(db::status(&pool).await.unwrap().thread, 8);
}

#[async_std::test]
async fn concurrent_duplicate_forums_conflict() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;

    let results = join_all((0..8).map(|i| forums::create_forum(&pool, NewForum {
        slug: "same".to_owned(),
        title: format!("Same {}", i),
        user: "alice".to_owned(),
    }))).await;

    let mut created = Vec::new();
    let mut conflicts = Vec::new();
    for result in results {
        match result.unwrap() {
            Creation::Created(forum) => created.push(forum),
            Creation::Conflict(forum) => conflicts.push(forum),
        }
    }
    assert_eq!(created.len(), 1);
    assert_eq!(conflicts.len(), 7);
    assert!(conflicts.iter().all(|forum| *forum == created[0]));
    assert_eq!(db::status(&pool).await.unwrap().forum, 1);
}

#[async_std::test]
async fn lists_forum_threads_by_creation_time() {
    let (_dir, pool) = install().await;
    create_user(&pool, "alice").await;
    create_forum(&pool, "pirates", "alice").await;
    let late = threads::create_thread(&pool, "pirates", new_thread(Some("late"), "alice", 18)).await.unwrap().into_inner();
    let early = threads::create_thread(&pool, "pirates", new_thread(Some("early"), "alice", 10)).await.unwrap().into_inner();
    let middle = threads::create_thread(&pool, "pirates", new_thread(Some("middle"), "alice", 14)).await.unwrap().into_inner();

    let ids = |threads: Vec<threads::Thread>| threads.iter().map(|t| t.id).collect::<Vec<_>>();

    let listed = threads::get_threads(&pool, "pirates", 0, None, false).await.unwrap();
    assert_eq!(ids(listed), vec![early.id, middle.id, late.id]);
    let listed = threads::get_threads(&pool, "pirates", 0, Some(at(14)), false).await.unwrap();
    assert_eq!(ids(listed), vec![middle.id, late.id]);
    let listed = threads::get_threads(&pool, "pirates", 0, Some(at(14)), true).await.unwrap();
    assert_eq!(ids(listed), vec![middle.id, early.id]);
    let listed = threads::get_threads(&pool, "pirates", 1, None, true).await.unwrap();
    assert_eq!(ids(listed), vec![late.id]);

    let result = threads::get_threads(&pool, "ninjas", 0, None, false).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::Forum(_)))));
}

#[async_std::test]
async fn updates_thread() {
    let (_dir, pool) = install().await;
    let thread = seed(&pool).await;

    let updated = threads::update_thread(&pool, &ThreadRef::Slug("treasure".to_owned()), UpdateThread {
        title: Some("Buried treasure".to_owned()),
        message: None,
    }).await.unwrap();
    assert_eq!(updated.title, "Buried treasure");
    assert_eq!(updated.message, thread.message);
    assert_eq!(updated.id, thread.id);

    let result = threads::update_thread(&pool, &ThreadRef::Id(thread.id + 1), UpdateThread::default()).await;
    assert!(matches!(result, Err(DbError::NotFound(Missing::Thread(_)))));
}

#[async_std::test]
async fn clear_removes_everything() {
    let (_dir, pool) = install().await;
    let thread = seed(&pool).await;
    create_thread(&pool, "pirates", "parrots", "alice").await;
    reply(&pool, &thread, "alice", 0).await;

    let status = db::status(&pool).await.unwrap();
    assert_eq!((status.user, status.forum, status.thread, status.post), (1, 1, 2, 1));

    db::clear(&pool).await.unwrap();
    let status = db::status(&pool).await.unwrap();
    assert_eq!((status.user, status.forum, status.thread, status.post), (0, 0, 0, 0));
    assert!(forums::get_forum(&pool, "pirates").await.unwrap().is_none());
}
