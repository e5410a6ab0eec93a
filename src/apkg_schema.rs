//! Table layout of the Anki 2.1 (schema 18) collection and media databases.
//!
//! The statements are reproduced exactly as the desktop client creates them;
//! renaming a column, dropping an index or losing a `WITHOUT ROWID` modifier
//! is not detected here and yields a package the client refuses or corrupts.

use log::debug;
use rusqlite::ToSql;

use crate::Error;
use crate::store::{Database, Store};

/// File name of the collection database inside the package.
pub const COLLECTION_FILE: &str = "collection.anki2";
/// File name of the media database inside the package.
pub const MEDIA_DB_FILE: &str = "collection.media.db2";
/// Folder holding imported media files inside the package.
pub const MEDIA_FOLDER: &str = "collection.media";
/// Collection schema version this crate writes.
pub const SCHEMA_VERSION: i64 = 18;
/// Primary key of the singleton `col` row.
pub const COLLECTION_ID: i64 = 1;

/// Wall clock of a package session, in the two units the tables store.
///
/// Seed statements bind it by name; each seed binds only the names it
/// mentions.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub secs: i64,
    pub millis: i64,
}

impl Timestamp {
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            secs: secs as i64,
            millis: (secs * 1000.0) as i64,
        }
    }

    fn bindings(&self) -> [(&'static str, &dyn ToSql); 4] {
        [
            (":id", &COLLECTION_ID as &dyn ToSql),
            (":ver", &SCHEMA_VERSION as &dyn ToSql),
            (":now_secs", &self.secs as &dyn ToSql),
            (":now_millis", &self.millis as &dyn ToSql),
        ]
    }
}

/// A table of the package: where it lives and how it is created.
#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub database: Database,
    /// `CREATE TABLE` plus its indexes. Not idempotent.
    pub schema: &'static str,
    /// Singleton rows inserted right after creation.
    pub seed: Option<&'static str>,
}

/// Parameterized write for reruns: inserts, or on a primary key conflict
/// updates the mutable columns instead of failing.
#[derive(Debug)]
pub struct Upsert {
    pub table: &'static Table,
    pub sql: &'static str,
}

/// Rows owned by a note type and keyed by `(ntid, ord)`, which also carry a
/// unique `(name, ntid)` index.
///
/// A rewrite runs `prune`, then `stage`, then `upsert` once per ordinal, all
/// inside one transaction. Staging moves every remaining name to a
/// placeholder unique to its ordinal, so a name may move to another ordinal
/// without tripping the name index.
#[derive(Debug)]
pub struct OrdinalRows {
    pub table: &'static Table,
    /// Deletes rows of note type `?1` whose ordinal is `>= ?2`.
    pub prune: &'static str,
    /// Renames every row of note type `?1` to `U+001F` followed by its ordinal.
    pub stage: &'static str,
    pub upsert: &'static str,
}

impl Table {
    /// Creates the table on a fresh container and inserts its seed rows.
    ///
    /// Fails with a storage fault when the table already exists.
    pub fn init(&self, store: &Store, now: &Timestamp) -> Result<(), Error> {
        debug!("Creating table {} in {:?} database", self.name, self.database);
        store.execute_batch(self.database, self.schema)?;
        if let Some(seed) = self.seed {
            store.execute_bound(self.database, seed, &now.bindings())?;
        }
        Ok(())
    }
}

/* crt = creation date in seconds, mod = last modified in milliseconds,
 * scm = schema modification time, dty = unused, ls = last sync time.
 * The json columns are legacy and stay empty for schema 18. */
pub const COL: Table = Table {
    name: "col",
    database: Database::Collection,
    schema: r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);"#,
    seed: Some(
        "INSERT INTO col VALUES(:id, :now_secs, :now_millis, :now_millis, :ver, 0, 0, 0, '', '', '', '', '')",
    ),
};

pub const NOTES: Table = Table {
    name: "notes",
    database: Database::Collection,
    schema: r#"
CREATE TABLE notes (
    id              integer primary key,   /* 0 */
    guid            text not null,         /* 1 */
    mid             integer not null,      /* 2 */
    mod             integer not null,      /* 3 */
    usn             integer not null,      /* 4 */
    tags            text not null,         /* 5 */
    flds            text not null,         /* 6 */
    sfld            integer not null,      /* 7 */
    csum            integer not null,      /* 8 */
    flags           integer not null,      /* 9 */
    data            text not null          /* 10 */
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_notes_csum on notes (csum);
CREATE INDEX idx_notes_mid ON notes (mid);"#,
    seed: None,
};

pub const CARDS: Table = Table {
    name: "cards",
    database: Database::Collection,
    schema: r#"
CREATE TABLE cards (
    id              integer primary key,   /* 0 */
    nid             integer not null,      /* 1 */
    did             integer not null,      /* 2 */
    ord             integer not null,      /* 3 */
    mod             integer not null,      /* 4 */
    usn             integer not null,      /* 5 */
    type            integer not null,      /* 6 */
    queue           integer not null,      /* 7 */
    due             integer not null,      /* 8 */
    ivl             integer not null,      /* 9 */
    factor          integer not null,      /* 10 */
    reps            integer not null,      /* 11 */
    lapses          integer not null,      /* 12 */
    left            integer not null,      /* 13 */
    odue            integer not null,      /* 14 */
    odid            integer not null,      /* 15 */
    flags           integer not null,      /* 16 */
    data            text not null          /* 17 */
);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX idx_cards_odid ON cards (odid) WHERE odid != 0;"#,
    seed: None,
};

pub const REVLOG: Table = Table {
    name: "revlog",
    database: Database::Collection,
    schema: r#"
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_revlog_cid on revlog (cid);"#,
    seed: None,
};

pub const DECK_CONFIG: Table = Table {
    name: "deck_config",
    database: Database::Collection,
    schema: r#"
CREATE TABLE deck_config (
    id integer PRIMARY KEY NOT NULL,
    name text NOT NULL COLLATE NOCASE,
    mtime_secs integer NOT NULL,
    usn integer NOT NULL,
    config blob NOT NULL
);"#,
    seed: None,
};

pub const CONFIG: Table = Table {
    name: "config",
    database: Database::Collection,
    schema: r#"
CREATE TABLE config (
    KEY text NOT NULL PRIMARY KEY,
    usn integer NOT NULL,
    mtime_secs integer NOT NULL,
    val blob NOT NULL
) without rowid;"#,
    seed: None,
};

pub const FIELDS: Table = Table {
    name: "fields",
    database: Database::Collection,
    schema: r#"
CREATE TABLE fields (
    ntid integer NOT NULL,
    ord integer NOT NULL,
    name text NOT NULL COLLATE NOCASE,
    config blob NOT NULL,
    PRIMARY KEY (ntid, ord)
) without rowid;
CREATE UNIQUE INDEX idx_fields_name_ntid ON fields (name, ntid);"#,
    seed: None,
};

pub const FIELD_ROWS: OrdinalRows = OrdinalRows {
    table: &FIELDS,
    prune: "DELETE FROM fields WHERE ntid = ?1 AND ord >= ?2",
    stage: "UPDATE fields SET name = char(31) || ord WHERE ntid = ?1",
    upsert: r#"
INSERT INTO fields (ntid, ord, name, config)
    VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (ntid, ord) DO UPDATE
SET
    name = excluded.name,
    config = excluded.config"#,
};

pub const TEMPLATES: Table = Table {
    name: "templates",
    database: Database::Collection,
    schema: r#"
CREATE TABLE templates (
    ntid integer NOT NULL,
    ord integer NOT NULL,
    name text NOT NULL COLLATE NOCASE,
    mtime_secs integer NOT NULL,
    usn integer NOT NULL,
    config blob NOT NULL,
    PRIMARY KEY (ntid, ord)
) without rowid;
CREATE UNIQUE INDEX idx_templates_name_ntid ON templates (name, ntid);
CREATE INDEX idx_templates_usn ON templates (usn);"#,
    seed: None,
};

pub const TEMPLATE_ROWS: OrdinalRows = OrdinalRows {
    table: &TEMPLATES,
    prune: "DELETE FROM templates WHERE ntid = ?1 AND ord >= ?2",
    stage: "UPDATE templates SET name = char(31) || ord WHERE ntid = ?1",
    upsert: r#"
INSERT INTO templates (ntid, ord, name, mtime_secs, usn, config)
    VALUES (?1, ?2, ?3, ?4, 0, ?5)
ON CONFLICT (ntid, ord) DO UPDATE
SET
    name = excluded.name,
    mtime_secs = excluded.mtime_secs,
    usn = usn + 1,
    config = excluded.config"#,
};

pub const NOTETYPES: Table = Table {
    name: "notetypes",
    database: Database::Collection,
    schema: r#"
CREATE TABLE notetypes (
    id integer NOT NULL PRIMARY KEY,
    name text NOT NULL COLLATE NOCASE,
    mtime_secs integer NOT NULL,
    usn integer NOT NULL,
    config blob NOT NULL
);
CREATE UNIQUE INDEX idx_notetypes_name ON notetypes (name);
CREATE INDEX idx_notetypes_usn ON notetypes (usn);"#,
    seed: None,
};

pub const NOTETYPE_UPSERT: Upsert = Upsert {
    table: &NOTETYPES,
    sql: r#"
INSERT INTO notetypes (id, name, mtime_secs, usn, config)
    VALUES (?1, ?2, ?3, 0, ?4)
ON CONFLICT (id) DO UPDATE
SET
    name = excluded.name,
    mtime_secs = excluded.mtime_secs,
    usn = usn + 1,
    config = excluded.config"#,
};

pub const DECKS: Table = Table {
    name: "decks",
    database: Database::Collection,
    schema: r#"
CREATE TABLE decks (
    id integer PRIMARY KEY NOT NULL,
    name text NOT NULL COLLATE NOCASE,
    mtime_secs integer NOT NULL,
    usn integer NOT NULL,
    common blob NOT NULL,
    kind blob NOT NULL
);
CREATE UNIQUE INDEX idx_decks_name ON decks (name);"#,
    seed: None,
};

pub const TAGS: Table = Table {
    name: "tags",
    database: Database::Collection,
    schema: r#"
CREATE TABLE tags (
    tag text NOT NULL PRIMARY KEY COLLATE NOCASE,
    usn integer NOT NULL,
    collapsed boolean NOT NULL,
    config blob NULL
) without rowid;"#,
    seed: None,
};

pub const GRAVES: Table = Table {
    name: "graves",
    database: Database::Collection,
    schema: r#"
CREATE TABLE graves (
    oid integer NOT NULL,
    type integer NOT NULL,
    usn integer NOT NULL,
    PRIMARY KEY (oid, type)
) WITHOUT ROWID;
CREATE INDEX idx_graves_pending ON graves (usn);"#,
    seed: None,
};

pub const ANDROID_METADATA: Table = Table {
    name: "android_metadata",
    database: Database::Collection,
    schema: r#"
CREATE TABLE android_metadata (
    locale TEXT
);"#,
    seed: None,
};

pub const MEDIA: Table = Table {
    name: "media",
    database: Database::Media,
    schema: r#"
CREATE TABLE media (
    fname text NOT NULL PRIMARY KEY,
    csum text,
    mtime int NOT NULL,
    dirty int NOT NULL
) without rowid;
CREATE INDEX idx_media_dirty ON media (dirty) WHERE dirty = 1;"#,
    seed: None,
};

pub const MEDIA_UPSERT: Upsert = Upsert {
    table: &MEDIA,
    sql: r#"
INSERT INTO media (fname, csum, mtime, dirty)
    VALUES (?1, ?2, ?3, 1)
ON CONFLICT (fname) DO UPDATE
SET
    csum = excluded.csum,
    mtime = excluded.mtime,
    dirty = 1"#,
};

pub const META: Table = Table {
    name: "meta",
    database: Database::Media,
    schema: r#"
CREATE TABLE meta (
    dirMod int,
    lastUsn int
);"#,
    seed: Some("INSERT INTO meta VALUES(:now_millis, 0)"),
};

/// Marks the media folder as modified at `?1` milliseconds.
///
/// `meta` has no key and holds exactly the one row its seed inserts, so this
/// is a plain update rather than an upsert.
pub const META_DIR_MOD: &str = "UPDATE meta SET dirMod = ?1";

/// Every table of a package, in creation order.
pub const CATALOG: [&Table; 15] = [
    &COL,
    &NOTES,
    &CARDS,
    &REVLOG,
    &DECK_CONFIG,
    &CONFIG,
    &FIELDS,
    &TEMPLATES,
    &NOTETYPES,
    &DECKS,
    &TAGS,
    &GRAVES,
    &ANDROID_METADATA,
    &MEDIA,
    &META,
];

/// Runs every table initializer against a fresh store.
pub fn init_all(store: &Store, now: &Timestamp) -> Result<(), Error> {
    for table in CATALOG {
        table.init(store, now)?;
    }
    Ok(())
}
