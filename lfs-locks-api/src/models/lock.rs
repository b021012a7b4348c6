use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
}

/// A file lock as represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub id: String,
    pub path: String,
    pub locked_at: String,
    pub owner: Owner,
}

impl Lock {
    pub fn is_owned_by(&self, user: &str) -> bool {
        self.owner.name == user
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLockRequest {
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnlockRequest {
    #[serde(default)]
    pub force: bool,
}

/// Filters accepted by the lock listing.
#[derive(Debug, Default, Deserialize)]
pub struct LockFilter {
    pub path: Option<String>,
    pub id: Option<String>,
}

pub enum CreateOutcome {
    Created(Lock),
    AlreadyLocked(Lock),
}

fn row_to_lock(row: &Row) -> rusqlite::Result<Lock> {
    Ok(Lock {
        id: row.get::<_, i64>("id")?.to_string(),
        path: row.get("path")?,
        locked_at: row.get("created_at")?,
        owner: Owner {
            name: row.get("owner")?,
        },
    })
}

pub fn find_all(conn: &Connection, project: &str, filter: &LockFilter) -> anyhow::Result<Vec<Lock>> {
    let mut sql = String::from("SELECT * FROM lfs_file_locks WHERE project = ?");
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(project.to_string())];

    if let Some(ref path) = filter.path {
        sql.push_str(" AND path = ?");
        values.push(Box::new(path.clone()));
    }
    if let Some(ref id) = filter.id {
        // A non-numeric id matches nothing
        let Ok(id) = id.parse::<i64>() else {
            return Ok(Vec::new());
        };
        sql.push_str(" AND id = ?");
        values.push(Box::new(id));
    }
    sql.push_str(" ORDER BY id");

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params.as_slice(), row_to_lock)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_by_id(conn: &Connection, project: &str, id: i64) -> anyhow::Result<Option<Lock>> {
    let lock = conn
        .query_row(
            "SELECT * FROM lfs_file_locks WHERE project = ? AND id = ?",
            params![project, id],
            row_to_lock,
        )
        .optional()?;
    Ok(lock)
}

pub fn find_by_path(conn: &Connection, project: &str, path: &str) -> anyhow::Result<Option<Lock>> {
    let lock = conn
        .query_row(
            "SELECT * FROM lfs_file_locks WHERE project = ? AND path = ?",
            params![project, path],
            row_to_lock,
        )
        .optional()?;
    Ok(lock)
}

/// Lock `path` for `owner`, or return the lock already held on it.
pub fn create(conn: &Connection, project: &str, path: &str, owner: &str) -> anyhow::Result<CreateOutcome> {
    let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let inserted = conn.execute(
        "INSERT INTO lfs_file_locks (project, path, owner, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(project, path) DO NOTHING",
        params![project, path, owner, now],
    )?;

    let lock = find_by_path(conn, project, path)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve lock for {}", path))?;

    if inserted == 0 {
        Ok(CreateOutcome::AlreadyLocked(lock))
    } else {
        Ok(CreateOutcome::Created(lock))
    }
}

pub fn delete(conn: &Connection, project: &str, id: i64) -> anyhow::Result<bool> {
    let changes = conn.execute(
        "DELETE FROM lfs_file_locks WHERE project = ? AND id = ?",
        params![project, id],
    )?;
    Ok(changes > 0)
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
    fn test_second_lock_on_same_path_returns_existing() {
        let conn = conn();
        let first = match create(&conn, "group/project", "a.psd", "alice").unwrap() {
            CreateOutcome::Created(lock) => lock,
            CreateOutcome::AlreadyLocked(_) => panic!("expected a new lock"),
        };
        match create(&conn, "group/project", "a.psd", "bob").unwrap() {
            CreateOutcome::AlreadyLocked(lock) => assert_eq!(lock, first),
            CreateOutcome::Created(_) => panic!("expected the existing lock"),
        }
    }

    #[test]
    fn test_locks_are_scoped_to_project() {
        let conn = conn();
        create(&conn, "group/one", "a.psd", "alice").unwrap();
        assert!(matches!(
            create(&conn, "group/two", "a.psd", "bob").unwrap(),
            CreateOutcome::Created(_)
        ));
        assert_eq!(find_all(&conn, "group/two", &LockFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_filters() {
        let conn = conn();
        create(&conn, "p", "a.psd", "alice").unwrap();
        create(&conn, "p", "b.psd", "bob").unwrap();

        let by_path = find_all(
            &conn,
            "p",
            &LockFilter {
                path: Some("b.psd".into()),
                id: None,
            },
        )
        .unwrap();
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].owner.name, "bob");

        let by_id = find_all(
            &conn,
            "p",
            &LockFilter {
                path: None,
                id: Some(by_path[0].id.clone()),
            },
        )
        .unwrap();
        assert_eq!(by_id, by_path);

        let bogus = LockFilter {
            path: None,
            id: Some("abc".into()),
        };
        assert!(find_all(&conn, "p", &bogus).unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let conn = conn();
        create(&conn, "p", "a.psd", "alice").unwrap();
        let lock = find_by_path(&conn, "p", "a.psd").unwrap().unwrap();
        let id: i64 = lock.id.parse().unwrap();

        assert!(!delete(&conn, "other", id).unwrap());
        assert!(delete(&conn, "p", id).unwrap());
        assert!(find_by_id(&conn, "p", id).unwrap().is_none());
    }
}
