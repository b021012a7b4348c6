//! Lock, unlock, list and verify rules on top of the lock store.

use crate::error::AppError;
use crate::models::lock::{self, CreateOutcome, Lock, LockFilter};
use rusqlite::Connection;

pub fn lock_file(conn: &Connection, project: &str, path: &str, user: &str) -> Result<Lock, AppError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(AppError::BadRequest("path is required".into()));
    }

    match lock::create(conn, project, path, user)? {
        CreateOutcome::Created(lock) => {
            tracing::info!("{} locked {} in {}", user, lock.path, project);
            Ok(lock)
        }
        CreateOutcome::AlreadyLocked(lock) => Err(AppError::Conflict {
            lock: Box::new(lock),
            message: "already created lock".into(),
        }),
    }
}

/// Only the owner may unlock, unless `force` is set.
pub fn unlock_file(
    conn: &Connection,
    project: &str,
    id: &str,
    user: &str,
    force: bool,
) -> Result<Lock, AppError> {
    let not_found = || AppError::NotFound("Lock not found".into());
    let id: i64 = id.parse().map_err(|_| not_found())?;
    let lock = lock::find_by_id(conn, project, id)?.ok_or_else(not_found)?;

    if !lock.is_owned_by(user) && !force {
        return Err(AppError::Forbidden(format!(
            "{} is locked by GitLab User {}",
            lock.path, lock.owner.name
        )));
    }

    if !lock::delete(conn, project, id)? {
        return Err(not_found());
    }
    if force && !lock.is_owned_by(user) {
        tracing::warn!("{} force-unlocked {} held by {} in {}", user, lock.path, lock.owner.name, project);
    } else {
        tracing::info!("{} unlocked {} in {}", user, lock.path, project);
    }
    Ok(lock)
}

pub fn find_locks(conn: &Connection, project: &str, filter: &LockFilter) -> Result<Vec<Lock>, AppError> {
    Ok(lock::find_all(conn, project, filter)?)
}

/// Partition `locks` into those owned by `user` and the rest.
pub fn split_by_owner(locks: Vec<Lock>, user: &str) -> (Vec<Lock>, Vec<Lock>) {
    locks.into_iter().partition(|lock| lock.is_owned_by(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::create_memory_pool;
    use crate::db::migrate::migrate;

    fn conn() -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        let pool = create_memory_pool();
        migrate(&pool).unwrap();
        pool.get().unwrap()
    }

    #[test]
    fn test_empty_path_rejected() {
        let conn = conn();
        assert!(matches!(lock_file(&conn, "p", "  ", "alice"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_unlock_rules() {
        let conn = conn();
        let lock = lock_file(&conn, "p", "a.psd", "alice").unwrap();

        assert!(matches!(unlock_file(&conn, "p", "999", "alice", false), Err(AppError::NotFound(_))));
        assert!(matches!(unlock_file(&conn, "p", "x", "alice", false), Err(AppError::NotFound(_))));
        match unlock_file(&conn, "p", &lock.id, "bob", false) {
            Err(AppError::Forbidden(message)) => assert!(message.contains("alice")),
            other => panic!("unexpected: {other:?}"),
        }

        let unlocked = unlock_file(&conn, "p", &lock.id, "bob", true).unwrap();
        assert_eq!(unlocked, lock);
        assert!(find_locks(&conn, "p", &LockFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_split_by_owner() {
        let conn = conn();
        lock_file(&conn, "p", "a.psd", "alice").unwrap();
        lock_file(&conn, "p", "b.psd", "bob").unwrap();
        lock_file(&conn, "p", "c.psd", "alice").unwrap();

        let locks = find_locks(&conn, "p", &LockFilter::default()).unwrap();
        let (ours, theirs) = split_by_owner(locks, "alice");
        assert_eq!(ours.iter().map(|l| l.path.as_str()).collect::<Vec<_>>(), vec!["a.psd", "c.psd"]);
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].owner.name, "bob");
    }
}
