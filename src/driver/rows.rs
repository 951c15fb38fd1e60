use std::sync::Arc;

use super::protocol::StoreRecord;

/// Outcome of an insert, update or delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub last_insert_id: u64,
    pub rows_affected: u64,
}

impl ExecResult {
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

/// Row set returned by a select. Column names come from the first record.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    records: std::vec::IntoIter<StoreRecord>,
    columns: Arc<Vec<String>>,
}

impl Rows {
    pub fn new(records: Vec<StoreRecord>) -> Self {
        let columns = records
            .first()
            .map(|r| r.units.iter().map(|u| u.key.clone()).collect())
            .unwrap_or_default();

        Self {
            records: records.into_iter(),
            columns: Arc::new(columns),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not yet consumed
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    pub fn close(self) {}
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let record = self.records.next()?;
        Some(Row {
            columns: self.columns.clone(),
            values: record.units.into_iter().map(|u| u.value).collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Option<Vec<u8>>>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw column bytes, `None` for NULL or an out-of-range index
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    pub fn get_str(&self, idx: usize) -> Option<&str> {
        self.get(idx).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&[u8]> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.get(idx)
    }

    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }

    pub fn into_values(self) -> Vec<Option<Vec<u8>>> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_iteration() {
        let rows = Rows::new(vec![
            StoreRecord::new(vec![("id", Some("1")), ("name", Some("alice"))]),
            StoreRecord::new(vec![("id", Some("2")), ("name", None)]),
        ]);
        assert_eq!(rows.columns(), &["id".to_string(), "name".to_string()]);
        assert_eq!(rows.remaining(), 2);

        let collected: Vec<Row> = rows.collect();
        assert_eq!(collected[0].get_str(1), Some("alice"));
        assert_eq!(collected[0].get_by_name("id"), Some(&b"1"[..]));
        assert!(collected[1].is_null(1));
        assert!(!collected[1].is_null(0));
    }

    #[test]
    fn test_empty_rows_have_no_columns() {
        let mut rows = Rows::new(Vec::new());
        assert!(rows.columns().is_empty());
        assert!(rows.next().is_none());
    }
}
