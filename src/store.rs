use log::debug;
use rusqlite::{Connection, Params, ToSql, Transaction};
use std::path::Path;

use crate::Error;
use crate::apkg_schema::{COLLECTION_FILE, MEDIA_DB_FILE};
use crate::error::database_error;

/// Which of the two package databases a statement runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Database {
    Collection,
    Media,
}

/// The collection and media databases of an open package.
///
/// Access is execute-only; every statement is its own atomic unit unless run
/// inside [`Store::transaction`]. No transaction ever spans both databases.
pub struct Store {
    collection: Connection,
    media: Connection,
}

impl Store {
    /// Opens (creating if needed) both database files inside `directory`.
    pub fn open(directory: &Path) -> Result<Self, Error> {
        let collection = Connection::open(directory.join(COLLECTION_FILE)).map_err(database_error)?;
        let media = Connection::open(directory.join(MEDIA_DB_FILE)).map_err(database_error)?;
        Ok(Self { collection, media })
    }

    fn connection(&self, database: Database) -> &Connection {
        match database {
            Database::Collection => &self.collection,
            Database::Media => &self.media,
        }
    }

    pub fn execute_batch(&self, database: Database, sql: &str) -> Result<(), Error> {
        self.connection(database).execute_batch(sql).map_err(database_error)
    }

    pub fn execute<P: Params>(&self, database: Database, sql: &str, params: P) -> Result<usize, Error> {
        self.connection(database)
            .execute(sql, params)
            .map_err(database_error)
    }

    /// Runs a single statement, binding each named value the statement
    /// actually mentions and skipping the rest.
    pub fn execute_bound(
        &self,
        database: Database,
        sql: &str,
        bindings: &[(&str, &dyn ToSql)],
    ) -> Result<usize, Error> {
        let mut stmt = self.connection(database).prepare(sql).map_err(database_error)?;
        for (name, value) in bindings {
            if let Some(idx) = stmt.parameter_index(name).map_err(database_error)? {
                stmt.raw_bind_parameter(idx, *value).map_err(database_error)?;
            }
        }
        stmt.raw_execute().map_err(database_error)
    }

    /// Runs `f` inside a transaction on one database, committing on success
    /// and rolling back on any error.
    pub fn transaction<T, F>(&mut self, database: Database, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Transaction) -> Result<T, Error>,
    {
        let conn = match database {
            Database::Collection => &mut self.collection,
            Database::Media => &mut self.media,
        };
        let transaction = conn.transaction().map_err(database_error)?;
        let value = f(&transaction)?;
        transaction.commit().map_err(database_error)?;
        Ok(value)
    }

    /// Closes both databases. Both are closed even when the first one fails.
    pub fn close(self) -> Result<(), Error> {
        debug!("Closing package databases");
        let collection = self.collection.close().map_err(|(_, e)| database_error(e));
        let media = self.media.close().map_err(|(_, e)| database_error(e));
        collection.and(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_both_database_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .execute_batch(Database::Media, "CREATE TABLE t (x int);")
            .unwrap();
        store.close().unwrap();
        assert!(dir.path().join(COLLECTION_FILE).exists());
        assert!(dir.path().join(MEDIA_DB_FILE).exists());
    }

    #[test]
    fn statements_are_scoped_to_their_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .execute_batch(Database::Collection, "CREATE TABLE only_here (x int);")
            .unwrap();
        let err = store
            .execute(Database::Media, "INSERT INTO only_here VALUES (?1)", [1])
            .unwrap_err();
        assert!(matches!(err, Error::StorageFault(_)));
    }

    #[test]
    fn execute_bound_skips_unused_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .execute_batch(Database::Collection, "CREATE TABLE t (a int, b int);")
            .unwrap();
        let inserted = store
            .execute_bound(
                Database::Collection,
                "INSERT INTO t VALUES (:a, :a)",
                &[(":a", &7 as &dyn ToSql), (":unused", &9 as &dyn ToSql)],
            )
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store
            .execute_batch(Database::Collection, "CREATE TABLE t (a int primary key);")
            .unwrap();
        let result: Result<(), Error> = store.transaction(Database::Collection, |tx| {
            tx.execute("INSERT INTO t VALUES (1)", []).map_err(database_error)?;
            tx.execute("INSERT INTO t VALUES (1)", []).map_err(database_error)?;
            Ok(())
        });
        assert!(result.is_err());
        store.close().unwrap();

        let conn = Connection::open(dir.path().join(COLLECTION_FILE)).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
