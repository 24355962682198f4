//! SQLite storage backend
//!
//! Opens a connection per operation instead of sharing one behind a lock,
//! so harvests for different jurisdictions write concurrently; SQLite's own
//! WAL locking and a busy timeout serialize the actual commits.

use super::traits::{
    BatchSummary, EventStore, OpenStore, RecordRejection, RefingerprintSummary, StorageError,
    StorageResult, UpsertOutcome,
};
use crate::model::{event_fingerprint, Bill, Event, Level};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_COLUMNS: &str = "id, fingerprint, state_code, name, date, time, location, committee, \
     level, source_url, docket_url, external_id, scraped_at, last_updated_at";

const BILL_COLUMNS: &str = "b.id, b.state_code, b.bill_number, b.title, b.description, b.url, \
     b.status, b.summary, b.content_hash, b.last_summarized_at, b.enrichment_error";

/// Open a configured connection to the database file.
pub(crate) fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        "#,
    )?;
    Ok(conn)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", text, e)))
}

fn parse_date(text: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| StorageError::DateParse(format!("{}: {}", text, e)))
}

/// SQLite-backed event store
///
/// Tables: `events` (unique fingerprint), `bills` (unique
/// `(state_code, bill_number)`), and `event_bills` linking the two.
pub struct SqliteStore {
    path: PathBuf,
    /// Keeps a temporary store's directory alive
    _temp_dir: Option<tempfile::TempDir>,
}

/// Raw `events` row before conversion.
struct EventRow {
    id: i64,
    fingerprint: String,
    state_code: String,
    name: String,
    date: String,
    time: Option<String>,
    location: String,
    committee: Option<String>,
    level: String,
    source_url: String,
    docket_url: Option<String>,
    external_id: Option<String>,
    scraped_at: String,
    last_updated_at: String,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint: row.get(1)?,
            state_code: row.get(2)?,
            name: row.get(3)?,
            date: row.get(4)?,
            time: row.get(5)?,
            location: row.get(6)?,
            committee: row.get(7)?,
            level: row.get(8)?,
            source_url: row.get(9)?,
            docket_url: row.get(10)?,
            external_id: row.get(11)?,
            scraped_at: row.get(12)?,
            last_updated_at: row.get(13)?,
        })
    }

    fn into_event(self) -> StorageResult<Event> {
        let time = match self.time {
            Some(t) => Some(
                NaiveTime::parse_from_str(&t, "%H:%M:%S")
                    .map_err(|e| StorageError::DateParse(format!("{}: {}", t, e)))?,
            ),
            None => None,
        };
        let level: Level = self.level.parse().map_err(StorageError::InvalidRow)?;
        Ok(Event {
            id: Some(self.id),
            jurisdiction_code: self.state_code,
            name: self.name,
            date: parse_date(&self.date)?,
            time,
            location: self.location,
            committee: self.committee,
            level,
            source_url: self.source_url,
            docket_url: self.docket_url,
            external_id: self.external_id,
            fingerprint: self.fingerprint,
            scraped_at: parse_timestamp(&self.scraped_at)?,
            last_updated_at: parse_timestamp(&self.last_updated_at)?,
            bills: Vec::new(),
        })
    }
}

/// Raw `bills` row (columns in `BILL_COLUMNS` order, starting at `offset`).
struct BillRow {
    id: i64,
    state_code: String,
    bill_number: String,
    title: String,
    description: Option<String>,
    url: String,
    status: Option<String>,
    summary: Option<String>,
    content_hash: Option<String>,
    last_summarized_at: Option<String>,
    enrichment_error: Option<String>,
}

impl BillRow {
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            state_code: row.get(offset + 1)?,
            bill_number: row.get(offset + 2)?,
            title: row.get(offset + 3)?,
            description: row.get(offset + 4)?,
            url: row.get(offset + 5)?,
            status: row.get(offset + 6)?,
            summary: row.get(offset + 7)?,
            content_hash: row.get(offset + 8)?,
            last_summarized_at: row.get(offset + 9)?,
            enrichment_error: row.get(offset + 10)?,
        })
    }

    fn into_bill(self) -> StorageResult<Bill> {
        Ok(Bill {
            id: Some(self.id),
            jurisdiction_code: self.state_code,
            bill_number: self.bill_number,
            title: self.title,
            description: self.description,
            url: self.url,
            status: self.status,
            summary: self.summary,
            content_hash: self.content_hash,
            last_summarized_at: self.last_summarized_at.as_deref().map(parse_timestamp).transpose()?,
            enrichment_error: self.enrichment_error,
        })
    }
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL UNIQUE,
                state_code TEXT NOT NULL,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                time TEXT,
                location TEXT NOT NULL DEFAULT '',
                committee TEXT,
                level TEXT NOT NULL CHECK (level IN ('state', 'local')),
                source_url TEXT NOT NULL CHECK (source_url <> ''),
                docket_url TEXT,
                external_id TEXT,
                scraped_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_state_date ON events(state_code, date);

            CREATE TABLE IF NOT EXISTS bills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                state_code TEXT NOT NULL,
                bill_number TEXT NOT NULL CHECK (bill_number <> ''),
                title TEXT NOT NULL,
                description TEXT,
                url TEXT NOT NULL,
                status TEXT,
                summary TEXT,
                content_hash TEXT,
                last_summarized_at TEXT,
                enrichment_error TEXT,
                created_at TEXT NOT NULL,
                last_updated_at TEXT NOT NULL,
                UNIQUE (state_code, bill_number)
            );

            CREATE TABLE IF NOT EXISTS event_bills (
                event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                bill_id INTEGER NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
                PRIMARY KEY (event_id, bill_id)
            );

            CREATE INDEX IF NOT EXISTS idx_event_bills_bill ON event_bills(bill_id);
            "#,
        )?;
        Ok(())
    }

    fn connect(&self) -> StorageResult<Connection> {
        open_connection(&self.path)
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn upsert_event_row(conn: &Connection, event: &Event) -> StorageResult<UpsertOutcome> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM events WHERE fingerprint = ?1",
                [&event.fingerprint],
                |row| row.get(0),
            )
            .optional()?;

        let seen_at = timestamp(event.scraped_at);
        let id: i64 = conn.query_row(
            r#"
            INSERT INTO events (fingerprint, state_code, name, date, time, location, committee,
                                level, source_url, docket_url, external_id, scraped_at,
                                created_at, last_updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?12)
            ON CONFLICT(fingerprint) DO UPDATE SET
                time = excluded.time,
                location = excluded.location,
                level = excluded.level,
                source_url = excluded.source_url,
                docket_url = COALESCE(excluded.docket_url, events.docket_url),
                external_id = COALESCE(excluded.external_id, events.external_id),
                scraped_at = excluded.scraped_at,
                last_updated_at = excluded.last_updated_at
            RETURNING id
            "#,
            params![
                event.fingerprint,
                event.jurisdiction_code,
                event.name,
                event.date.format("%Y-%m-%d").to_string(),
                event.time.map(|t| t.format("%H:%M:%S").to_string()),
                event.location,
                event.committee,
                event.level.as_str(),
                event.source_url,
                event.docket_url,
                event.external_id,
                seen_at,
            ],
            |row| row.get(0),
        )?;

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated(id),
            None => UpsertOutcome::Inserted(id),
        })
    }

    fn upsert_bill_row(conn: &Connection, bill: &Bill, at: DateTime<Utc>) -> StorageResult<i64> {
        let id = conn.query_row(
            r#"
            INSERT INTO bills (state_code, bill_number, title, description, url, status,
                               created_at, last_updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(state_code, bill_number) DO UPDATE SET
                title = CASE WHEN excluded.title = excluded.bill_number THEN bills.title
                             ELSE excluded.title END,
                description = COALESCE(excluded.description, bills.description),
                url = excluded.url,
                status = COALESCE(excluded.status, bills.status),
                last_updated_at = excluded.last_updated_at
            RETURNING id
            "#,
            params![
                bill.jurisdiction_code,
                bill.bill_number,
                bill.title,
                bill.description,
                bill.url,
                bill.status,
                timestamp(at),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Returns 1 if a new link was created.
    fn link_row(conn: &Connection, event_id: i64, bill_id: i64) -> StorageResult<usize> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO event_bills (event_id, bill_id) VALUES (?1, ?2)",
            params![event_id, bill_id],
        )?;
        Ok(changed)
    }

    /// Event row, its bills, and their links. Returns (outcome, bills, new links).
    fn write_event(conn: &Connection, event: &Event) -> StorageResult<(UpsertOutcome, usize, usize)> {
        let outcome = Self::upsert_event_row(conn, event)?;
        let mut links = 0;
        for bill in &event.bills {
            let bill_id = Self::upsert_bill_row(conn, bill, event.scraped_at)?;
            links += Self::link_row(conn, outcome.id(), bill_id)?;
        }
        Ok((outcome, event.bills.len(), links))
    }

    fn load_events(
        conn: &Connection,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> StorageResult<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY date, time, name",
            EVENT_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut events = rows
            .into_iter()
            .map(EventRow::into_event)
            .collect::<StorageResult<Vec<_>>>()?;

        if events.is_empty() {
            return Ok(events);
        }

        let mut by_event: HashMap<i64, Vec<Bill>> = HashMap::new();
        let bill_sql = format!(
            "SELECT eb.event_id, {} FROM event_bills eb \
             JOIN bills b ON b.id = eb.bill_id \
             WHERE eb.event_id IN (SELECT id FROM events WHERE {}) \
             ORDER BY b.bill_number",
            BILL_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&bill_sql)?;
        let rows = stmt
            .query_map(args, |row| Ok((row.get::<_, i64>(0)?, BillRow::from_row(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (event_id, bill) in rows {
            by_event.entry(event_id).or_default().push(bill.into_bill()?);
        }
        for event in &mut events {
            if let Some(id) = event.id {
                event.bills = by_event.remove(&id).unwrap_or_default();
            }
        }
        Ok(events)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = open_connection(path.as_ref())?;
        Self::init_schema(&conn)?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            _temp_dir: None,
        })
    }

    fn open_temporary() -> StorageResult<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capitol.db");
        let conn = open_connection(&path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            path,
            _temp_dir: Some(dir),
        })
    }
}

impl EventStore for SqliteStore {
    // === Single-record writes ===

    fn upsert_event(&self, event: &Event) -> StorageResult<UpsertOutcome> {
        let conn = self.connect()?;
        Self::upsert_event_row(&conn, event)
    }

    fn upsert_bill(&self, bill: &Bill) -> StorageResult<i64> {
        let conn = self.connect()?;
        Self::upsert_bill_row(&conn, bill, Utc::now())
    }

    fn link_event_bill(&self, event_id: i64, bill_id: i64) -> StorageResult<()> {
        let conn = self.connect()?;
        Self::link_row(&conn, event_id, bill_id)?;
        Ok(())
    }

    // === Batch writes ===

    fn upsert_events(&self, jurisdiction: &str, events: &[Event]) -> StorageResult<BatchSummary> {
        let mut conn = self.connect()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut summary = BatchSummary::default();

        for event in events {
            if event.jurisdiction_code != jurisdiction {
                summary.rejected.push(RecordRejection {
                    fingerprint: event.fingerprint.clone(),
                    reason: format!(
                        "event belongs to {}, not {}",
                        event.jurisdiction_code, jurisdiction
                    ),
                });
                continue;
            }

            let savepoint = tx.savepoint()?;
            match Self::write_event(&savepoint, event) {
                Ok((outcome, bills, links)) => {
                    savepoint.commit()?;
                    match outcome {
                        UpsertOutcome::Inserted(_) => summary.inserted += 1,
                        UpsertOutcome::Updated(_) => summary.updated += 1,
                    }
                    summary.bills += bills;
                    summary.links += links;
                }
                Err(StorageError::Conflict(reason)) => {
                    // Dropping the savepoint rolls back this record only.
                    drop(savepoint);
                    tracing::warn!(
                        jurisdiction,
                        fingerprint = %event.fingerprint,
                        reason = %reason,
                        "rejected event"
                    );
                    summary.rejected.push(RecordRejection {
                        fingerprint: event.fingerprint.clone(),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tx.commit()?;
        tracing::debug!(
            jurisdiction,
            inserted = summary.inserted,
            updated = summary.updated,
            rejected = summary.rejected.len(),
            "persisted batch"
        );
        Ok(summary)
    }

    fn upsert_bills(&self, bills: &[Bill]) -> StorageResult<Vec<i64>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let ids = bills
            .iter()
            .map(|bill| Self::upsert_bill_row(&tx, bill, now))
            .collect::<StorageResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    fn link_event_bills(&self, links: &[(i64, i64)]) -> StorageResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for (event_id, bill_id) in links {
            Self::link_row(&tx, *event_id, *bill_id)?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Reads ===

    fn upcoming_events(&self, jurisdiction: &str, from: NaiveDate) -> StorageResult<Vec<Event>> {
        let conn = self.connect()?;
        let from = from.format("%Y-%m-%d").to_string();
        Self::load_events(&conn, "state_code = ?1 AND date >= ?2", &[&jurisdiction, &from])
    }

    fn event_by_fingerprint(&self, fingerprint: &str) -> StorageResult<Option<Event>> {
        let conn = self.connect()?;
        Ok(Self::load_events(&conn, "fingerprint = ?1", &[&fingerprint])?
            .into_iter()
            .next())
    }

    fn event_count(&self, jurisdiction: Option<&str>) -> StorageResult<usize> {
        let conn = self.connect()?;
        let count: i64 = match jurisdiction {
            Some(j) => conn.query_row(
                "SELECT COUNT(*) FROM events WHERE state_code = ?1",
                [j],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn list_bills(&self, jurisdiction: Option<&str>) -> StorageResult<Vec<Bill>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM bills b WHERE (?1 IS NULL OR b.state_code = ?1) \
             ORDER BY b.last_updated_at DESC, b.id",
            BILL_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([jurisdiction], |row| BillRow::from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(BillRow::into_bill).collect()
    }

    fn bill_by_number(&self, jurisdiction: &str, bill_number: &str) -> StorageResult<Option<Bill>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM bills b WHERE b.state_code = ?1 AND b.bill_number = ?2",
            BILL_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![jurisdiction, bill_number], |row| BillRow::from_row(row, 0))
            .optional()?;
        row.map(BillRow::into_bill).transpose()
    }

    // === Enrichment ===

    fn record_summary(
        &self,
        bill_id: i64,
        summary: &str,
        content_hash: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bills SET summary = ?1, content_hash = ?2, last_summarized_at = ?3, \
             enrichment_error = NULL WHERE id = ?4",
            params![summary, content_hash, timestamp(at), bill_id],
        )?;
        Ok(())
    }

    fn record_enrichment_failure(&self, bill_id: i64, error: &str) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE bills SET enrichment_error = ?1 WHERE id = ?2",
            params![error, bill_id],
        )?;
        Ok(())
    }

    // === Maintenance ===

    fn purge_events_before(&self, cutoff: NaiveDate) -> StorageResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM events WHERE date < ?1",
            [cutoff.format("%Y-%m-%d").to_string()],
        )?;
        Ok(removed)
    }

    fn refingerprint_all(&self) -> StorageResult<RefingerprintSummary> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: Vec<(i64, String, String, String, Option<String>, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, state_code, name, date, committee, fingerprint FROM events ORDER BY id",
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
            })?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let mut summary = RefingerprintSummary {
            examined: rows.len(),
            ..Default::default()
        };

        // new fingerprint -> [(id, old fingerprint)], lowest id first
        let mut groups: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
        for (id, state_code, name, date, committee, old) in rows {
            let fingerprint = event_fingerprint(&state_code, &name, parse_date(&date)?, committee.as_deref());
            groups.entry(fingerprint).or_default().push((id, old));
        }

        for members in groups.values() {
            let survivor = members[0].0;
            for (duplicate, _) in &members[1..] {
                tx.execute(
                    "INSERT OR IGNORE INTO event_bills (event_id, bill_id) \
                     SELECT ?1, bill_id FROM event_bills WHERE event_id = ?2",
                    params![survivor, duplicate],
                )?;
                tx.execute("DELETE FROM events WHERE id = ?1", [duplicate])?;
                summary.merged += 1;
            }
        }

        // Two passes so a rename never trips the unique index mid-way.
        let changed: Vec<(i64, &String)> = groups
            .iter()
            .filter(|(fingerprint, members)| members[0].1 != **fingerprint)
            .map(|(fingerprint, members)| (members[0].0, fingerprint))
            .collect();
        for (id, _) in &changed {
            tx.execute(
                "UPDATE events SET fingerprint = 'rekey:' || id WHERE id = ?1",
                [id],
            )?;
        }
        for (id, fingerprint) in &changed {
            tx.execute(
                "UPDATE events SET fingerprint = ?1 WHERE id = ?2",
                params![fingerprint, id],
            )?;
        }
        summary.updated = changed.len();

        tx.commit()?;
        tracing::info!(
            examined = summary.examined,
            updated = summary.updated,
            merged = summary.merged,
            "re-fingerprinted events"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_temporary().unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn meeting(jurisdiction: &str, name: &str, day: u32, scraped: DateTime<Utc>) -> Event {
        Event::new(
            jurisdiction,
            name,
            date(day),
            Level::State,
            "https://leg.example/calendar",
            scraped,
        )
        .with_time(NaiveTime::from_hms_opt(9, 0, 0))
        .with_location("Room 2134")
    }

    fn bill(jurisdiction: &str, number: &str, title: &str) -> Bill {
        Bill::new(jurisdiction, number, title, "https://leg.example/bill")
    }

    // ========================================================================
    // Event upserts
    // ========================================================================

    #[test]
    fn test_upsert_event_is_idempotent_on_fingerprint() {
        let store = create_test_store();
        let first = meeting("NV", "Senate Finance", 20, at(8));
        let outcome = store.upsert_event(&first).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Inserted(_)));

        let moved = meeting("NV", "Senate Finance", 20, at(14)).with_location("Room 1214");
        let again = store.upsert_event(&moved).unwrap();
        assert_eq!(again, UpsertOutcome::Updated(outcome.id()));

        assert_eq!(store.event_count(Some("NV")).unwrap(), 1);
        let stored = store.event_by_fingerprint(&first.fingerprint).unwrap().unwrap();
        assert_eq!(stored.location, "Room 1214");
        assert_eq!(stored.last_updated_at, at(14));

        let created: String = store
            .connect()
            .unwrap()
            .query_row("SELECT created_at FROM events WHERE id = ?1", [outcome.id()], |r| r.get(0))
            .unwrap();
        assert_eq!(parse_timestamp(&created).unwrap(), at(8));
    }

    #[test]
    fn test_distinct_committees_are_distinct_rows() {
        let store = create_test_store();
        store
            .upsert_event(&meeting("NC", "Finance", 20, at(8)).with_committee(Some("House Finance".into())))
            .unwrap();
        store
            .upsert_event(&meeting("NC", "Finance", 20, at(8)).with_committee(Some("Senate Finance".into())))
            .unwrap();
        assert_eq!(store.event_count(Some("NC")).unwrap(), 2);
    }

    // ========================================================================
    // Bill upserts
    // ========================================================================

    #[test]
    fn test_placeholder_title_never_overwrites_real_title() {
        let store = create_test_store();
        let id = store.upsert_bill(&bill("NV", "AB 12", "Revises provisions relating to water")).unwrap();
        let again = store.upsert_bill(&bill("NV", "AB 12", "")).unwrap();
        assert_eq!(id, again);

        let stored = store.bill_by_number("NV", "AB 12").unwrap().unwrap();
        assert_eq!(stored.title, "Revises provisions relating to water");

        store.upsert_bill(&bill("NV", "AB 12", "Revises provisions relating to groundwater")).unwrap();
        let stored = store.bill_by_number("NV", "AB 12").unwrap().unwrap();
        assert_eq!(stored.title, "Revises provisions relating to groundwater");
    }

    #[test]
    fn test_bill_upsert_keeps_known_description_and_enrichment() {
        let store = create_test_store();
        let described = bill("NV", "SB 4", "Elections").with_description(Some("Makes changes to ballots".into()));
        let id = store.upsert_bill(&described).unwrap();
        store
            .record_summary(id, "Changes ballot rules.", &described.current_content_hash(), at(9))
            .unwrap();

        store.upsert_bill(&bill("NV", "SB 4", "Elections")).unwrap();

        let stored = store.bill_by_number("NV", "SB 4").unwrap().unwrap();
        assert_eq!(stored.description.as_deref(), Some("Makes changes to ballots"));
        assert_eq!(stored.summary.as_deref(), Some("Changes ballot rules."));
        assert_eq!(stored.content_hash, Some(described.current_content_hash()));
        assert_eq!(stored.last_summarized_at, Some(at(9)));
    }

    #[test]
    fn test_bills_are_scoped_by_jurisdiction() {
        let store = create_test_store();
        let nv = store.upsert_bill(&bill("NV", "SB 1", "Nevada bill")).unwrap();
        let nc = store.upsert_bill(&bill("NC", "SB 1", "Carolina bill")).unwrap();
        assert_ne!(nv, nc);
        assert_eq!(store.list_bills(None).unwrap().len(), 2);
        assert_eq!(store.list_bills(Some("NC")).unwrap()[0].title, "Carolina bill");
    }

    #[test]
    fn test_enrichment_failure_keeps_summary() {
        let store = create_test_store();
        let id = store.upsert_bill(&bill("NV", "AB 3", "Taxes")).unwrap();
        store.record_summary(id, "About taxes.", "hash", at(9)).unwrap();
        store.record_enrichment_failure(id, "model unavailable").unwrap();

        let stored = store.bill_by_number("NV", "AB 3").unwrap().unwrap();
        assert_eq!(stored.summary.as_deref(), Some("About taxes."));
        assert_eq!(stored.enrichment_error.as_deref(), Some("model unavailable"));

        store.record_summary(id, "About taxes, again.", "hash2", at(10)).unwrap();
        let stored = store.bill_by_number("NV", "AB 3").unwrap().unwrap();
        assert_eq!(stored.enrichment_error, None);
    }

    // ========================================================================
    // Links
    // ========================================================================

    #[test]
    fn test_links_are_idempotent() {
        let store = create_test_store();
        let event_id = store.upsert_event(&meeting("NV", "Senate Finance", 20, at(8))).unwrap().id();
        let bill_id = store.upsert_bill(&bill("NV", "SB 9", "Budget")).unwrap();
        store.link_event_bill(event_id, bill_id).unwrap();
        store.link_event_bills(&[(event_id, bill_id), (event_id, bill_id)]).unwrap();

        let events = store.upcoming_events("NV", date(1)).unwrap();
        assert_eq!(events[0].bills.len(), 1);
        assert_eq!(events[0].bills[0].bill_number, "SB 9");
    }

    #[test]
    fn test_linking_unknown_event_is_a_conflict() {
        let store = create_test_store();
        let bill_id = store.upsert_bill(&bill("NV", "SB 9", "Budget")).unwrap();
        let err = store.link_event_bill(9_999, bill_id).unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    // ========================================================================
    // Batches
    // ========================================================================

    #[test]
    fn test_batch_counts_inserts_updates_and_links() {
        let store = create_test_store();
        let events = vec![
            meeting("NV", "Senate Finance", 20, at(8)).with_bill(bill("NV", "SB 1", "")),
            meeting("NV", "Assembly Ways and Means", 21, at(8))
                .with_bill(bill("NV", "SB 1", ""))
                .with_bill(bill("NV", "AB 2", "")),
        ];
        let first = store.upsert_events("NV", &events).unwrap();
        assert_eq!((first.inserted, first.updated, first.bills, first.links), (2, 0, 3, 3));

        let second = store.upsert_events("NV", &events).unwrap();
        assert_eq!((second.inserted, second.updated, second.links), (0, 2, 0));
        assert_eq!(store.event_count(Some("NV")).unwrap(), 2);
        assert_eq!(store.list_bills(Some("NV")).unwrap().len(), 2);
    }

    #[test]
    fn test_batch_rejects_only_the_conflicting_record() {
        let store = create_test_store();
        let mut broken = meeting("NV", "Interim Finance", 22, at(8));
        broken.source_url = String::new();
        let events = vec![
            meeting("NV", "Senate Finance", 20, at(8)),
            broken.clone(),
            meeting("NC", "House Rules", 20, at(8)),
            meeting("NV", "Assembly Judiciary", 21, at(8)),
        ];

        let summary = store.upsert_events("NV", &events).unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.rejected.len(), 2);
        assert!(summary.rejected.iter().any(|r| r.fingerprint == broken.fingerprint));
        assert_eq!(store.event_count(None).unwrap(), 2);
    }

    // ========================================================================
    // Reads and maintenance
    // ========================================================================

    #[test]
    fn test_upcoming_events_filters_and_orders() {
        let store = create_test_store();
        let events = vec![
            meeting("NV", "Late", 25, at(8)),
            meeting("NV", "Past", 10, at(8)),
            meeting("NV", "Early", 19, at(8)),
        ];
        store.upsert_events("NV", &events).unwrap();
        store.upsert_events("NC", &[meeting("NC", "Other", 20, at(8))]).unwrap();

        let upcoming = store.upcoming_events("NV", date(18)).unwrap();
        let names: Vec<_> = upcoming.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Early", "Late"]);
        assert!(upcoming.iter().all(|e| e.id.is_some()));
        assert_eq!(upcoming[0].time, NaiveTime::from_hms_opt(9, 0, 0));
    }

    #[test]
    fn test_purge_removes_old_events_and_their_links() {
        let store = create_test_store();
        store
            .upsert_events(
                "NV",
                &[
                    meeting("NV", "Old", 1, at(8)).with_bill(bill("NV", "SB 1", "")),
                    meeting("NV", "New", 25, at(8)),
                ],
            )
            .unwrap();

        assert_eq!(store.purge_events_before(date(10)).unwrap(), 1);
        assert_eq!(store.event_count(None).unwrap(), 1);
        let links: i64 = store
            .connect()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM event_bills", [], |r| r.get(0))
            .unwrap();
        assert_eq!(links, 0);
        // Bills outlive the meetings that mentioned them.
        assert!(store.bill_by_number("NV", "SB 1").unwrap().is_some());
    }

    #[test]
    fn test_refingerprint_repairs_and_merges() {
        let store = create_test_store();
        let a = meeting("NV", "Senate Finance", 20, at(8)).with_bill(bill("NV", "SB 1", ""));
        let b = meeting("NV", "Senate  Finance", 20, at(8)).with_bill(bill("NV", "SB 2", ""));
        let c = meeting("NV", "Assembly Judiciary", 21, at(8));
        // Same normalized identity, so a and b share a fingerprint already;
        // store b under a stale one to simulate an older algorithm.
        store.upsert_events("NV", &[a.clone(), c.clone()]).unwrap();
        let mut stale_b = b.clone();
        stale_b.fingerprint = "v0-stale-b".to_string();
        store.upsert_events("NV", &[stale_b]).unwrap();
        store
            .connect()
            .unwrap()
            .execute("UPDATE events SET fingerprint = 'v0-stale-c' WHERE fingerprint = ?1", [&c.fingerprint])
            .unwrap();

        let summary = store.refingerprint_all().unwrap();
        assert_eq!(summary.examined, 3);
        assert_eq!(summary.merged, 1);
        assert_eq!(summary.updated, 1);

        assert_eq!(store.event_count(None).unwrap(), 2);
        let merged = store.event_by_fingerprint(&a.fingerprint).unwrap().unwrap();
        let numbers: Vec<_> = merged.bills.iter().map(|b| b.bill_number.as_str()).collect();
        assert_eq!(numbers, vec!["SB 1", "SB 2"]);
        assert!(store.event_by_fingerprint(&c.fingerprint).unwrap().is_some());
    }

    // ========================================================================
    // Connection behaviour
    // ========================================================================

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .connect()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_concurrent_jurisdiction_batches() {
        let store = std::sync::Arc::new(create_test_store());
        let handles: Vec<_> = ["NV", "NC", "TX", "WA"]
            .into_iter()
            .map(|code| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let events: Vec<Event> = (1..=20)
                        .map(|i| meeting(code, &format!("Committee {}", i), 20, at(8)))
                        .collect();
                    store.upsert_events(code, &events).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().inserted, 20);
        }
        assert_eq!(store.event_count(None).unwrap(), 80);
    }

    #[test]
    fn test_reopen_sees_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("capitol.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.upsert_event(&meeting("NV", "Senate Finance", 20, at(8))).unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.event_count(Some("NV")).unwrap(), 1);
    }
}
