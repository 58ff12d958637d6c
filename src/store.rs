//! In-memory tables behind a repository trait.
//!
//! Each table sits behind its own mutex. Nothing is persisted and there is
//! no update or delete path; records live until the process exits.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Anomaly, AuditLogEntry, ConsumptionRecord, Forecast, Record, Scenario, User};

/// Repository interface the HTTP handlers are written against.
pub trait Store: Send + Sync {
    fn insert_user(&self, user: User);
    fn users(&self) -> Vec<User>;

    /// Inserts every record the iterator yields and returns how many were
    /// inserted. Records already inserted stay if the caller's iterator
    /// stops early.
    fn insert_consumption(&self, records: &mut dyn Iterator<Item = ConsumptionRecord>) -> usize;
    /// All consumption records, or only those whose region equals `region`.
    fn consumption(&self, region: Option<&str>) -> Vec<ConsumptionRecord>;

    fn insert_forecast(&self, forecast: Forecast);
    fn forecasts(&self) -> Vec<Forecast>;

    fn insert_anomaly(&self, anomaly: Anomaly);
    fn anomalies(&self) -> Vec<Anomaly>;

    fn insert_scenario(&self, scenario: Scenario);
    fn scenarios(&self) -> Vec<Scenario>;

    fn append_audit(&self, entry: AuditLogEntry);
    fn audit_log(&self) -> Vec<AuditLogEntry>;
}

/// Insertion-ordered table keyed by record id.
///
/// Inserting an id that already exists replaces the stored record in place.
#[derive(Debug)]
pub struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Record + Clone> Table<T> {
    pub fn insert(&mut self, record: T) {
        match self.index.get(record.id()) {
            Some(&pos) => self.rows[pos] = record,
            None => {
                self.index.insert(record.id().to_string(), self.rows.len());
                self.rows.push(record);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.rows.clone()
    }
}

/// Process-local store: five tables and the audit log.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<Table<User>>,
    consumption: Mutex<Table<ConsumptionRecord>>,
    forecasts: Mutex<Table<Forecast>>,
    anomalies: Mutex<Table<Anomaly>>,
    scenarios: Mutex<Table<Scenario>>,
    audit: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Recovers a poisoned lock; the table contents stay usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Store for MemoryStore {
    fn insert_user(&self, user: User) {
        lock(&self.users).insert(user);
    }

    fn users(&self) -> Vec<User> {
        lock(&self.users).to_vec()
    }

    fn insert_consumption(&self, records: &mut dyn Iterator<Item = ConsumptionRecord>) -> usize {
        let mut table = lock(&self.consumption);
        let mut inserted = 0;
        for record in records {
            table.insert(record);
            inserted += 1;
        }
        inserted
    }

    fn consumption(&self, region: Option<&str>) -> Vec<ConsumptionRecord> {
        let table = lock(&self.consumption);
        match region {
            Some(region) => table
                .iter()
                .filter(|r| r.region == region)
                .cloned()
                .collect(),
            None => table.to_vec(),
        }
    }

    fn insert_forecast(&self, forecast: Forecast) {
        lock(&self.forecasts).insert(forecast);
    }

    fn forecasts(&self) -> Vec<Forecast> {
        lock(&self.forecasts).to_vec()
    }

    fn insert_anomaly(&self, anomaly: Anomaly) {
        lock(&self.anomalies).insert(anomaly);
    }

    fn anomalies(&self) -> Vec<Anomaly> {
        lock(&self.anomalies).to_vec()
    }

    fn insert_scenario(&self, scenario: Scenario) {
        lock(&self.scenarios).insert(scenario);
    }

    fn scenarios(&self) -> Vec<Scenario> {
        lock(&self.scenarios).to_vec()
    }

    fn append_audit(&self, entry: AuditLogEntry) {
        lock(&self.audit).push(entry);
    }

    fn audit_log(&self) -> Vec<AuditLogEntry> {
        lock(&self.audit).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::new_id;

    fn record(region: &str, value: f64) -> ConsumptionRecord {
        ConsumptionRecord {
            id: new_id(),
            region: region.to_string(),
            timestamp: "2023-01-01 00:00:00".to_string(),
            value,
            file_id: "f-1".to_string(),
        }
    }

    #[test]
    fn table_keeps_insertion_order() {
        let mut table = Table::default();
        let a = record("North", 1.0);
        let b = record("South", 2.0);
        table.insert(a.clone());
        table.insert(b.clone());
        let ids: Vec<&str> = table.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);
    }

    #[test]
    fn table_replaces_duplicate_id_in_place() {
        let mut table = Table::default();
        let a = record("North", 1.0);
        table.insert(a.clone());
        table.insert(ConsumptionRecord { value: 9.0, ..a.clone() });
        let rows = table.to_vec();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 9.0);
    }

    #[test]
    fn region_filter_is_exact_match() {
        let store = MemoryStore::new();
        let rows = vec![record("North", 1.0), record("South", 2.0), record("north", 3.0)];
        assert_eq!(store.insert_consumption(&mut rows.into_iter()), 3);

        let north = store.consumption(Some("North"));
        assert_eq!(north.len(), 1);
        assert!(north.iter().all(|r| r.region == "North"));
        assert_eq!(store.consumption(None).len(), 3);
    }

    #[test]
    fn rows_before_a_stopped_iterator_stay_inserted() {
        let store = MemoryStore::new();
        let rows = vec![Ok(record("North", 1.0)), Ok(record("East", 2.0)), Err(())];
        let mut failed = false;
        let inserted = {
            let mut it = rows.into_iter().map_while(|r| match r {
                Ok(rec) => Some(rec),
                Err(()) => {
                    failed = true;
                    None
                }
            });
            store.insert_consumption(&mut it)
        };
        assert!(failed);
        assert_eq!(inserted, 2);
        assert_eq!(store.consumption(None).len(), 2);
    }

    #[test]
    fn audit_log_is_append_only() {
        let store = MemoryStore::new();
        store.append_audit(AuditLogEntry::by_mock_user("upload", "f-1"));
        store.append_audit(AuditLogEntry::by_mock_user("upload", "f-2"));
        let log = store.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].target_id, "f-2");
    }

    #[test]
    fn users_table_starts_empty() {
        assert!(MemoryStore::new().users().is_empty());
    }
}
