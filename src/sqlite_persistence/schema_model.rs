use anyhow::{bail, Result};
use rusqlite::Connection;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Allow unused_mut because the variable is only mutated when optional
            // field assignments are passed to the macro (e.g., `is_primary_key = true`)
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }
}

/// A plain `REFERENCES foreign_table(foreign_column)` clause.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub indices: &'static [(&'static str, &'static str)],
}

/// A column as reported by `PRAGMA table_info`.
struct ActualColumn {
    name: String,
    sql_type: String,
    non_null: bool,
    default_value: Option<String>,
    is_primary_key: bool,
}

struct ActualForeignKey {
    from_column: String,
    to_table: String,
    to_column: String,
}

fn strip_outer_parentheses(s: &str) -> &str {
    if s.starts_with('(') && s.ends_with(')') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if column.is_unique {
                create_sql.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
            if let Some(fk) = column.foreign_key {
                create_sql.push_str(&format!(
                    " REFERENCES {}({})",
                    fk.foreign_table, fk.foreign_column
                ));
            }
        }
        create_sql.push_str(");");
        conn.execute(&create_sql, [])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                [],
            )?;
        }
        Ok(())
    }

    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
                [self.name],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(found.is_some())
    }

    /// Verify the live table carries every expected column with the expected
    /// type, nullability, primary key flag, default and foreign key, and that
    /// every declared index exists.
    ///
    /// Extra columns are tolerated: additive migrations on legacy stores keep
    /// historical columns around rather than dropping data.
    pub fn validate(&self, conn: &Connection) -> Result<()> {
        if !self.exists(conn)? {
            bail!("Table {} is missing", self.name);
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<ActualColumn> = stmt
            .query_map([], |row| {
                Ok(ActualColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        for expected in self.columns {
            let actual = match actual_columns.iter().find(|c| c.name == expected.name) {
                Some(actual) => actual,
                None => bail!(
                    "Table {} is missing column {}. Found columns: {}",
                    self.name,
                    expected.name,
                    actual_columns
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            if actual.sql_type != expected.sql_type.as_sql() {
                bail!(
                    "Table {} column {} type mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type.as_sql(),
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
            // Defaults are only checked when declared: columns added by
            // ALTER TABLE on legacy stores carry defaults a fresh CREATE
            // does not, and inserts always supply explicit values anyway.
            // Stored defaults might be wrapped in parentheses, so strip
            // before comparing.
            if let Some(expected_default) = expected.default_value {
                if actual.default_value.as_deref().map(strip_outer_parentheses)
                    != Some(strip_outer_parentheses(expected_default))
                {
                    bail!(
                        "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                        self.name,
                        expected.name,
                        expected.default_value,
                        actual.default_value
                    );
                }
            }
        }

        // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
        let mut fk_stmt = conn.prepare(&format!("PRAGMA foreign_key_list({});", self.name))?;
        let actual_fks: Vec<ActualForeignKey> = fk_stmt
            .query_map([], |row| {
                Ok(ActualForeignKey {
                    from_column: row.get(3)?,
                    to_table: row.get(2)?,
                    to_column: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        for column in self.columns {
            if let Some(expected_fk) = column.foreign_key {
                let found = actual_fks.iter().any(|actual| {
                    actual.from_column == column.name
                        && actual.to_table == expected_fk.foreign_table
                        && actual.to_column == expected_fk.foreign_column
                });
                if !found {
                    bail!(
                        "Table {} column {} is missing foreign key: expected REFERENCES {}({})",
                        self.name,
                        column.name,
                        expected_fk.foreign_table,
                        expected_fk.foreign_column
                    );
                }
            }
        }

        for (index_name, _columns) in self.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    [index_name, &self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_TABLE: Table = Table {
        name: "parent",
        columns: &[sqlite_column!("id", SqlType::Integer, is_primary_key = true)],
        indices: &[],
    };

    const CHILD_TABLE: Table = Table {
        name: "child",
        columns: &[
            sqlite_column!("id", SqlType::Integer, is_primary_key = true),
            sqlite_column!("label", SqlType::Text, non_null = true, is_unique = true),
            sqlite_column!(
                "parent_id",
                SqlType::Integer,
                foreign_key = Some(ForeignKey {
                    foreign_table: "parent",
                    foreign_column: "id",
                })
            ),
        ],
        indices: &[("idx_child_label", "label")],
    };

    fn create_both(conn: &Connection) {
        PARENT_TABLE.create(conn).unwrap();
        CHILD_TABLE.create(conn).unwrap();
    }

    #[test]
    fn create_then_validate_round_trips() {
        let conn = Connection::open_in_memory().unwrap();
        create_both(&conn);
        PARENT_TABLE.validate(&conn).unwrap();
        CHILD_TABLE.validate(&conn).unwrap();
    }

    #[test]
    fn validate_detects_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("is missing"));
    }

    #[test]
    fn validate_detects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute("CREATE TABLE child (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing column label"));
    }

    #[test]
    fn validate_detects_type_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                label INTEGER NOT NULL UNIQUE,
                parent_id INTEGER REFERENCES parent(id)
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_child_label ON child(label)", [])
            .unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn validate_detects_missing_foreign_key() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL UNIQUE,
                parent_id INTEGER
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_child_label ON child(label)", [])
            .unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing foreign key"));
    }

    #[test]
    fn validate_detects_foreign_key_to_wrong_table() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute("CREATE TABLE other (id INTEGER PRIMARY KEY)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL UNIQUE,
                parent_id INTEGER REFERENCES other(id)
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_child_label ON child(label)", [])
            .unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing foreign key"));
    }

    #[test]
    fn validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL UNIQUE,
                parent_id INTEGER REFERENCES parent(id)
            )",
            [],
        )
        .unwrap();
        let err = CHILD_TABLE.validate(&conn).unwrap_err();
        assert!(err.to_string().contains("missing index"));
    }

    #[test]
    fn validate_tolerates_extra_columns() {
        let conn = Connection::open_in_memory().unwrap();
        PARENT_TABLE.create(&conn).unwrap();
        conn.execute(
            "CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL UNIQUE,
                parent_id INTEGER REFERENCES parent(id),
                legacy_note TEXT
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_child_label ON child(label)", [])
            .unwrap();
        CHILD_TABLE.validate(&conn).unwrap();
    }
}
