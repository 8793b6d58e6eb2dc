// SQLite sink for finished activity records

use std::path::Path;

use rusqlite::{params, Connection};

use crate::types::{ActivityRecord, Mood};

/// Persistence for completed activity records. Records are inserted whole
/// and queried by day; there are no update or delete operations.
pub struct ActivityStore {
    conn: Connection,
}

impl ActivityStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                day INTEGER NOT NULL,
                steps_walked INTEGER NOT NULL,
                hours_slept REAL NOT NULL,
                water_intake REAL NOT NULL,
                exercise_duration INTEGER NOT NULL,
                mood TEXT,
                calories_intake INTEGER NOT NULL,
                productivity_score INTEGER NOT NULL,
                work_done TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(ActivityStore { conn })
    }

    /// Insert one record, returning its autoincrement id.
    pub fn insert(&self, record: &ActivityRecord) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO activities (day, steps_walked, hours_slept, water_intake,
                 exercise_duration, mood, calories_intake, productivity_score,
                 work_done, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.day,
                record.steps_walked,
                record.hours_slept,
                record.water_intake_liters,
                record.exercise_duration_minutes,
                record.mood.map(|m| m.as_str()),
                record.calories_intake,
                record.productivity_score,
                record.work_done,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All records logged for a given day, oldest first.
    pub fn for_day(&self, day: u32) -> rusqlite::Result<Vec<ActivityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT day, steps_walked, hours_slept, water_intake, exercise_duration,
                    mood, calories_intake, productivity_score, work_done
             FROM activities WHERE day = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([day], |row| {
            let mood: Option<String> = row.get(5)?;
            Ok(ActivityRecord {
                day: row.get(0)?,
                steps_walked: row.get(1)?,
                hours_slept: row.get(2)?,
                water_intake_liters: row.get(3)?,
                exercise_duration_minutes: row.get(4)?,
                mood: mood.and_then(|m| m.parse::<Mood>().ok()),
                calories_intake: row.get(6)?,
                productivity_score: row.get(7)?,
                work_done: row.get(8)?,
            })
        })?;

        rows.collect()
    }
}
