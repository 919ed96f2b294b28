//! Materialized query results.

use crate::error::{RecordError, RecordResult};
use crate::value::{Record, Value};
use tokio_postgres::Row;

/// One result row as ordered `(column, value)` pairs.
///
/// Column order follows the SELECT list. UUID columns arrive as their
/// canonical text form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    columns: Vec<(String, Value)>,
}

impl ResultRow {
    pub(crate) fn from_row(row: &Row) -> RecordResult<Self> {
        let columns = row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let value: Value = row
                    .try_get(idx)
                    .map_err(|e| RecordError::decode(column.name(), e.to_string()))?;
                Ok((column.name().to_string(), value))
            })
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Value of `column`; the first match wins when a join repeats a name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keyed by column name. Later duplicates overwrite earlier ones.
    pub fn into_record(self) -> Record {
        self.columns.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Every row returned by one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    rows: Vec<ResultRow>,
}

impl Rows {
    pub(crate) fn from_driver(rows: &[Row]) -> RecordResult<Self> {
        let rows = rows
            .iter()
            .map(ResultRow::from_row)
            .collect::<RecordResult<Vec<_>>>()?;
        Ok(Self { rows })
    }

    /// The first row, or an empty row when the query matched nothing.
    pub fn one(self) -> ResultRow {
        self.rows.into_iter().next().unwrap_or_default()
    }

    /// `column` of the first row.
    pub fn text(&self, column: &str) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(column))
    }

    pub fn all(self) -> Vec<ResultRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRow> {
        self.rows.iter()
    }
}

impl From<Vec<ResultRow>> for Rows {
    fn from(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }
}

impl IntoIterator for Rows {
    type Item = ResultRow;
    type IntoIter = std::vec::IntoIter<ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> ResultRow {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn one_on_empty_result_is_an_empty_row() {
        assert!(Rows::default().one().is_empty());
    }

    #[test]
    fn text_reads_from_the_first_row() {
        let rows = Rows::from(vec![
            row(&[("id", 1.into()), ("name", "ana".into())]),
            row(&[("id", 2.into()), ("name", "bo".into())]),
        ]);
        assert_eq!(rows.text("name"), Some(&Value::from("ana")));
        assert_eq!(rows.text("missing"), None);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn columns_keep_select_order() {
        let r = row(&[("z", 1.into()), ("a", 2.into())]);
        assert_eq!(r.columns().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(r.into_record().keys().next().map(String::as_str), Some("a"));
    }
}
