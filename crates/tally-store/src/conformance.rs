//! Behaviour every [`AccountStore`] backend must exhibit.
//!
//! Each backend's test module calls [`run_all`] with a factory that yields a
//! fresh, empty store.

use std::sync::Arc;
use std::thread;

use tally_types::{Account, CredentialHash, Username};

use crate::error::StoreError;
use crate::traits::{AccountStore, UnitOfWork};

pub type Factory<'a> = &'a dyn Fn() -> Box<dyn AccountStore>;

pub fn name(s: &str) -> Username {
    Username::parse(s).unwrap()
}

pub fn account(s: &str) -> Account {
    Account::new_user(name(s), CredentialHash::from_phc("$argon2id$test"))
}

pub fn run_all(make: Factory<'_>) {
    get_missing_is_none(make());
    put_then_get_bumps_revision(make());
    delete_is_idempotent(make());
    list_is_sorted(make());
    exists_tracks_presence(make());
    create_rejects_taken_username(make());
    stale_update_changes_nothing(make());
    update_of_deleted_record_is_not_found(make());
    commit_returns_written_records(make());
    optimistic_delete_checks_revision(make());
    delete_and_credit_commit_together(make());
    clear_removes_everything(make());
    concurrent_increments_are_not_lost(make());
}

fn get_missing_is_none(store: Box<dyn AccountStore>) {
    assert!(store.get(&name("nobody")).unwrap().is_none());
}

fn put_then_get_bumps_revision(store: Box<dyn AccountStore>) {
    let mut a = account("alice");
    store.put(&a).unwrap();
    let first = store.get(&name("alice")).unwrap().expect("stored");
    assert_eq!(first.revision, 1);
    assert_eq!(first.tokens, a.tokens);

    a.tokens = 42;
    store.put(&a).unwrap();
    let second = store.get(&name("alice")).unwrap().expect("stored");
    assert_eq!(second.revision, 2);
    assert_eq!(second.tokens, 42);
}

fn delete_is_idempotent(store: Box<dyn AccountStore>) {
    store.put(&account("bob")).unwrap();
    assert!(store.delete(&name("bob")).unwrap());
    assert!(!store.delete(&name("bob")).unwrap());
    assert!(!store.delete(&name("never-existed")).unwrap());
    assert!(store.get(&name("bob")).unwrap().is_none());
}

fn list_is_sorted(store: Box<dyn AccountStore>) {
    for n in ["carol", "alice", "bob"] {
        store.put(&account(n)).unwrap();
    }
    let names: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|a| a.username.into_inner())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
}

fn exists_tracks_presence(store: Box<dyn AccountStore>) {
    assert!(!store.exists(&name("dave")).unwrap());
    store.put(&account("dave")).unwrap();
    assert!(store.exists(&name("dave")).unwrap());
}

fn create_rejects_taken_username(store: Box<dyn AccountStore>) {
    let work = UnitOfWork::new().create(account("erin"));
    store.commit(&work).unwrap();
    let err = store.commit(&work).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
    assert_eq!(store.list().unwrap().len(), 1);
}

fn stale_update_changes_nothing(store: Box<dyn AccountStore>) {
    store.put(&account("from")).unwrap();
    store.put(&account("to")).unwrap();
    let mut from = store.get(&name("from")).unwrap().unwrap();
    let mut to = store.get(&name("to")).unwrap().unwrap();

    // Someone else writes `to` after we read it.
    let mut interloper = to.clone();
    interloper.tokens = 7;
    store.commit(&UnitOfWork::new().update(interloper)).unwrap();

    from.tokens = 1;
    to.tokens = 99;
    let err = store
        .commit(&UnitOfWork::new().update(from).update(to))
        .unwrap_err();
    assert!(err.is_conflict());

    let from_after = store.get(&name("from")).unwrap().unwrap();
    let to_after = store.get(&name("to")).unwrap().unwrap();
    assert_eq!(from_after.tokens, 0);
    assert_eq!(from_after.revision, 1);
    assert_eq!(to_after.tokens, 7);
}

fn update_of_deleted_record_is_not_found(store: Box<dyn AccountStore>) {
    store.put(&account("gone")).unwrap();
    let read = store.get(&name("gone")).unwrap().unwrap();
    store.delete(&name("gone")).unwrap();
    let err = store.commit(&UnitOfWork::new().update(read)).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.get(&name("gone")).unwrap().is_none());
}

fn commit_returns_written_records(store: Box<dyn AccountStore>) {
    store.put(&account("x")).unwrap();
    let mut x = store.get(&name("x")).unwrap().unwrap();
    x.tokens = 5;
    let written = store
        .commit(&UnitOfWork::new().update(x).create(account("y")))
        .unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].revision, 2);
    assert_eq!(written[0].tokens, 5);
    assert_eq!(written[1].revision, 1);
    assert_eq!(store.get(&name("y")).unwrap().unwrap().revision, 1);
}

fn optimistic_delete_checks_revision(store: Box<dyn AccountStore>) {
    store.put(&account("victim")).unwrap();
    let read = store.get(&name("victim")).unwrap().unwrap();

    let mut bumped = read.clone();
    bumped.tokens = 3;
    store.commit(&UnitOfWork::new().update(bumped)).unwrap();

    let err = store
        .commit(&UnitOfWork::new().delete(name("victim"), read.revision))
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(store.exists(&name("victim")).unwrap());

    let current = store.get(&name("victim")).unwrap().unwrap();
    let written = store
        .commit(&UnitOfWork::new().delete(name("victim"), current.revision))
        .unwrap();
    assert!(written.is_empty());
    assert!(!store.exists(&name("victim")).unwrap());

    let err = store
        .commit(&UnitOfWork::new().delete(name("victim"), current.revision))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

fn delete_and_credit_commit_together(store: Box<dyn AccountStore>) {
    store.put(&account("leaving")).unwrap();
    store.put(&account("staying")).unwrap();
    let leaving = store.get(&name("leaving")).unwrap().unwrap();
    let mut staying = store.get(&name("staying")).unwrap().unwrap();
    staying.tokens = 9;

    // A stale record anywhere in the unit blocks the delete too.
    let mut stale = staying.clone();
    stale.revision += 1;
    let err = store
        .commit(
            &UnitOfWork::new()
                .delete(leaving.username.clone(), leaving.revision)
                .update(stale),
        )
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(store.exists(&name("leaving")).unwrap());

    let written = store
        .commit(
            &UnitOfWork::new()
                .delete(leaving.username.clone(), leaving.revision)
                .update(staying),
        )
        .unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].tokens, 9);
    assert!(!store.exists(&name("leaving")).unwrap());
}

fn clear_removes_everything(store: Box<dyn AccountStore>) {
    for n in ["a", "b", "c"] {
        store.put(&account(n)).unwrap();
    }
    assert_eq!(store.clear().unwrap(), 3);
    assert!(store.list().unwrap().is_empty());
    assert_eq!(store.clear().unwrap(), 0);
}

fn concurrent_increments_are_not_lost(store: Box<dyn AccountStore>) {
    const THREADS: usize = 4;
    const ROUNDS: usize = 25;

    let store: Arc<dyn AccountStore> = Arc::from(store);
    store.put(&account("counter")).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    loop {
                        let mut a = store.get(&name("counter")).unwrap().unwrap();
                        a.tokens += 1;
                        match store.commit(&UnitOfWork::new().update(a)) {
                            Ok(_) => break,
                            Err(e) if e.is_conflict() => continue,
                            Err(e) => panic!("unexpected store error: {e}"),
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread should not panic");
    }

    let a = store.get(&name("counter")).unwrap().unwrap();
    assert_eq!(a.tokens, (THREADS * ROUNDS) as i64);
    store.flush().unwrap();
}
