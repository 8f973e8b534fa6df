//! Motion library.
//!
//! Persists recorded [`Sequence`]s and named [`CartesianTarget`]s to a local
//! SQLite database.
//!
//! # Storage layout
//!
//! Two tables are created (if they do not already exist):
//!
//! `sequences`
//!
//! | column     | type | description                                   |
//! |------------|------|-----------------------------------------------|
//! | name       | TEXT | Primary key, trimmed and non-blank            |
//! | steps      | TEXT | JSON array of `{pose, speed}` steps           |
//! | created_at | TEXT | RFC-3339 time of the first save (UTC)         |
//! | updated_at | TEXT | RFC-3339 time of the latest save (UTC)        |
//!
//! `points`
//!
//! | column     | type | description                                   |
//! |------------|------|-----------------------------------------------|
//! | name       | TEXT | Primary key                                   |
//! | x, y, z    | REAL | Position in millimetres                       |
//! | pitch_deg  | REAL | Wrist pitch                                   |
//! | roll_deg   | REAL | Wrist roll                                    |
//! | created_at | TEXT | RFC-3339 time of the latest save (UTC)        |
//!
//! # Example
//!
//! ```rust
//! use armctl_memory::library::MotionLibrary;
//! use armctl_types::{ActuatorPose, MotionStep, Sequence};
//!
//! let library = MotionLibrary::open_in_memory().unwrap();
//! let wave = Sequence::new("wave", vec![MotionStep::new(ActuatorPose::home(), 50)]).unwrap();
//! library.put_sequence(&wave).unwrap();
//!
//! assert_eq!(library.get_sequence("wave").unwrap(), Some(wave));
//! ```

use armctl_types::{ArmError, CartesianTarget, MotionStep, Sequence};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from library operations.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Step encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ArmError),
}

impl From<LibraryError> for ArmError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::Invalid(inner) => inner,
            other => ArmError::Storage(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SavedPoint
// ─────────────────────────────────────────────────────────────────────────────

/// A named Cartesian target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPoint {
    pub name: String,
    pub target: CartesianTarget,
    pub saved_at: DateTime<Utc>,
}

fn parse_timestamp(raw: &str, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    raw.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::InvalidColumnType(column, e.to_string(), rusqlite::types::Type::Text)
    })
}

fn checked_name(name: &str) -> Result<&str, ArmError> {
    let name = name.trim();
    if name.is_empty() {
        Err(ArmError::BlankName)
    } else {
        Ok(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MotionLibrary
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed store of sequences and points.
pub struct MotionLibrary {
    conn: Connection,
}

impl MotionLibrary {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, LibraryError> {
        let conn = Connection::open(path)?;
        let library = Self { conn };
        library.init_schema()?;
        Ok(library)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, LibraryError> {
        let conn = Connection::open_in_memory()?;
        let library = Self { conn };
        library.init_schema()?;
        Ok(library)
    }

    fn init_schema(&self) -> Result<(), LibraryError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sequences (
                name       TEXT NOT NULL PRIMARY KEY,
                steps      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS points (
                name       TEXT NOT NULL PRIMARY KEY,
                x          REAL NOT NULL,
                y          REAL NOT NULL,
                z          REAL NOT NULL,
                pitch_deg  REAL NOT NULL,
                roll_deg   REAL NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // ── sequences ────────────────────────────────────────────────────────────

    /// Insert or overwrite a sequence. Blank names and empty sequences are
    /// refused.
    pub fn put_sequence(&self, sequence: &Sequence) -> Result<(), LibraryError> {
        sequence.validate()?;
        let name = checked_name(&sequence.name)?;
        let steps = serde_json::to_string(&sequence.steps)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sequences (name, steps, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 steps = excluded.steps,
                 updated_at = excluded.updated_at",
            params![name, steps, now],
        )?;
        debug!(name, steps = sequence.steps.len(), "sequence saved");
        Ok(())
    }

    pub fn get_sequence(&self, name: &str) -> Result<Option<Sequence>, LibraryError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT steps FROM sequences WHERE name = ?1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => {
                let steps: Vec<MotionStep> = serde_json::from_str(&raw)?;
                Ok(Some(Sequence {
                    name: name.trim().to_string(),
                    steps,
                }))
            }
            None => Ok(None),
        }
    }

    /// All sequences ordered by name.
    pub fn list_sequences(&self) -> Result<Vec<Sequence>, LibraryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, steps FROM sequences ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let steps: String = row.get(1)?;
            Ok((name, steps))
        })?;

        let mut sequences = Vec::new();
        for row in rows {
            let (name, raw) = row?;
            sequences.push(Sequence {
                name,
                steps: serde_json::from_str(&raw)?,
            });
        }
        Ok(sequences)
    }

    /// Returns `true` when a sequence was removed.
    pub fn delete_sequence(&self, name: &str) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM sequences WHERE name = ?1", params![name.trim()])?;
        Ok(removed > 0)
    }

    // ── points ───────────────────────────────────────────────────────────────

    /// Insert or overwrite a named point.
    pub fn put_point(&self, name: &str, target: &CartesianTarget) -> Result<(), LibraryError> {
        let name = checked_name(name)?;
        if !target.is_finite() {
            return Err(ArmError::Unreachable.into());
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO points
                 (name, x, y, z, pitch_deg, roll_deg, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                name,
                target.x,
                target.y,
                target.z,
                target.pitch_deg,
                target.roll_deg,
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(name, "point saved");
        Ok(())
    }

    pub fn get_point(&self, name: &str) -> Result<Option<SavedPoint>, LibraryError> {
        let point = self
            .conn
            .query_row(
                "SELECT name, x, y, z, pitch_deg, roll_deg, created_at
                 FROM points WHERE name = ?1",
                params![name.trim()],
                row_to_point,
            )
            .optional()?;
        Ok(point)
    }

    /// All points ordered by name.
    pub fn list_points(&self) -> Result<Vec<SavedPoint>, LibraryError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, x, y, z, pitch_deg, roll_deg, created_at
             FROM points ORDER BY name ASC",
        )?;
        let points = stmt
            .query_map([], row_to_point)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(points)
    }

    pub fn delete_point(&self, name: &str) -> Result<bool, LibraryError> {
        let removed = self
            .conn
            .execute("DELETE FROM points WHERE name = ?1", params![name.trim()])?;
        Ok(removed > 0)
    }
}

fn row_to_point(row: &rusqlite::Row<'_>) -> Result<SavedPoint, rusqlite::Error> {
    let saved_at: String = row.get(6)?;
    Ok(SavedPoint {
        name: row.get(0)?,
        target: CartesianTarget::new(row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        saved_at: parse_timestamp(&saved_at, 6)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use armctl_types::ActuatorPose;

    fn make_sequence(name: &str, n: usize) -> Sequence {
        let steps = (0..n)
            .map(|i| MotionStep::new(ActuatorPose::new([90, 90 - i as i32, 90, 90, 0, 90]), 50))
            .collect();
        Sequence {
            name: name.to_string(),
            steps,
        }
    }

    // ── sequences ────────────────────────────────────────────────────────────

    #[test]
    fn put_and_get_sequence() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        let seq = make_sequence("pick", 3);
        lib.put_sequence(&seq).unwrap();
        assert_eq!(lib.get_sequence("pick").unwrap(), Some(seq));
        assert_eq!(lib.get_sequence("missing").unwrap(), None);
    }

    #[test]
    fn put_sequence_overwrites_by_name() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        lib.put_sequence(&make_sequence("pick", 3)).unwrap();
        lib.put_sequence(&make_sequence("pick", 1)).unwrap();

        let all = lib.list_sequences().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].steps.len(), 1);
    }

    #[test]
    fn put_sequence_rejects_invalid() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        let err = lib.put_sequence(&make_sequence("empty", 0)).unwrap_err();
        assert!(matches!(err, LibraryError::Invalid(ArmError::EmptySequence)));
        let err = lib.put_sequence(&make_sequence("   ", 2)).unwrap_err();
        assert!(matches!(err, LibraryError::Invalid(ArmError::BlankName)));
        assert!(lib.list_sequences().unwrap().is_empty());
    }

    #[test]
    fn list_sequences_sorted_by_name() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        lib.put_sequence(&make_sequence("wave", 2)).unwrap();
        lib.put_sequence(&make_sequence("drop", 1)).unwrap();
        let names: Vec<_> = lib
            .list_sequences()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["drop", "wave"]);
    }

    #[test]
    fn delete_sequence_reports_removal() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        lib.put_sequence(&make_sequence("pick", 2)).unwrap();
        assert!(lib.delete_sequence("pick").unwrap());
        assert!(!lib.delete_sequence("pick").unwrap());
    }

    #[test]
    fn sequences_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.db");
        let path = path.to_string_lossy();
        {
            let lib = MotionLibrary::open(&path).unwrap();
            lib.put_sequence(&make_sequence("pick", 2)).unwrap();
            lib.put_point("bin", &CartesianTarget::new(100.0, 100.0, 40.0, -90.0, 15.0))
                .unwrap();
        }
        let lib = MotionLibrary::open(&path).unwrap();
        assert_eq!(lib.get_sequence("pick").unwrap().unwrap().steps.len(), 2);
        assert_eq!(lib.get_point("bin").unwrap().unwrap().target.roll_deg, 15.0);
    }

    // ── points ───────────────────────────────────────────────────────────────

    #[test]
    fn put_get_delete_point() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        let target = CartesianTarget::new(0.0, 150.0, 50.0, -90.0, 0.0);
        lib.put_point(" above-bin ", &target).unwrap();

        let point = lib.get_point("above-bin").unwrap().unwrap();
        assert_eq!(point.name, "above-bin");
        assert_eq!(point.target, target);

        assert!(lib.delete_point("above-bin").unwrap());
        assert!(lib.get_point("above-bin").unwrap().is_none());
    }

    #[test]
    fn put_point_rejects_blank_name_and_nan() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        let err = lib.put_point("", &CartesianTarget::default()).unwrap_err();
        assert!(matches!(err, LibraryError::Invalid(ArmError::BlankName)));
        let nan = CartesianTarget::new(f64::NAN, 0.0, 0.0, 0.0, 0.0);
        assert!(lib.put_point("bad", &nan).is_err());
    }

    #[test]
    fn list_points_sorted_by_name() {
        let lib = MotionLibrary::open_in_memory().unwrap();
        lib.put_point("b", &CartesianTarget::default()).unwrap();
        lib.put_point("a", &CartesianTarget::default()).unwrap();
        let names: Vec<_> = lib.list_points().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn library_error_converts_to_arm_error() {
        let err: ArmError = LibraryError::Invalid(ArmError::EmptySequence).into();
        assert_eq!(err, ArmError::EmptySequence);
        let err: ArmError =
            LibraryError::Sqlite(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, ArmError::Storage(_)));
    }
}
