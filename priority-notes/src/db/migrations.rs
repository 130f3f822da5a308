use lazy_static::lazy_static;
use rusqlite_migration::{Migrations, M};

lazy_static! {
    pub static ref MIGRATIONS: Migrations<'static> = Migrations::new(vec![
        M::up(
            r#"
            CREATE TABLE users (
                id BLOB PRIMARY KEY CHECK(length(id) = 16) NOT NULL UNIQUE DEFAULT (uuid7_now()),
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                password_hash TEXT NOT NULL,

                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME
            );
        "#
        ),
        M::up(
            r#"
            CREATE TABLE notes (
                id BLOB PRIMARY KEY CHECK(length(id) = 16) NOT NULL UNIQUE DEFAULT (uuid7_now()),
                owner_id BLOB NOT NULL CHECK(length(owner_id) = 16),
                parent_id BLOB CHECK(length(parent_id) = 16),

                title TEXT,
                content TEXT NOT NULL DEFAULT '',
                date DATETIME NOT NULL,
                priority INTEGER NOT NULL DEFAULT 1 CHECK(priority BETWEEN 0 AND 3),
                status TEXT NOT NULL DEFAULT 'not_started',

                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,

                FOREIGN KEY (owner_id) REFERENCES users (id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES notes (id) ON DELETE SET NULL
            );

            CREATE INDEX notes_owner_order ON notes (owner_id, priority DESC, date DESC, updated_at DESC);
        "#
        ),
    ]);
}
