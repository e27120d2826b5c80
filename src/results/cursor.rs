use std::sync::Arc;

use async_trait::async_trait;

use super::result_set::ResultSet;
use super::row::CustomDbRow;
use crate::driver::RowCursor;
use crate::error::QueryHelperError;
use crate::types::RowValues;

/// Forward-only cursor over a buffered [`ResultSet`].
#[derive(Debug)]
pub struct ResultSetCursor {
    column_names: Arc<Vec<String>>,
    rows: std::vec::IntoIter<CustomDbRow>,
    current: Option<CustomDbRow>,
    closed: bool,
}

impl ResultSetCursor {
    #[must_use]
    pub fn new(result_set: ResultSet) -> Self {
        let column_names = Arc::clone(result_set.column_names());
        Self {
            column_names,
            rows: result_set.results.into_iter(),
            current: None,
            closed: false,
        }
    }

    /// Whether [`RowCursor::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rows not yet fetched.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl RowCursor for ResultSetCursor {
    async fn advance(&mut self) -> Result<bool, QueryHelperError> {
        if self.closed {
            return Err(QueryHelperError::ExecutionError(
                "cursor already closed".into(),
            ));
        }
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get(&self, column: &str) -> Option<&RowValues> {
        self.current.as_ref().and_then(|row| row.get(column))
    }

    fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.current.as_ref().and_then(|row| row.get_by_index(index))
    }

    fn column_names(&self) -> &[String] {
        &self.column_names
    }

    async fn close(&mut self) -> Result<(), QueryHelperError> {
        self.closed = true;
        self.current = None;
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet::new(vec!["PK".into(), "Name".into()])
            .with_row(vec![RowValues::Int(1), RowValues::Text("a".into())])
            .with_row(vec![RowValues::Int(2), RowValues::Text("b".into())])
    }

    #[tokio::test]
    async fn walks_rows_in_order() -> Result<(), QueryHelperError> {
        let mut cursor = ResultSetCursor::new(sample());
        assert!(cursor.get("PK").is_none());

        assert!(cursor.advance().await?);
        assert_eq!(cursor.get("PK"), Some(&RowValues::Int(1)));
        assert_eq!(cursor.get("name"), Some(&RowValues::Text("a".into())));

        assert!(cursor.advance().await?);
        assert_eq!(cursor.get_by_index(0), Some(&RowValues::Int(2)));

        assert!(!cursor.advance().await?);
        assert!(cursor.get("PK").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn close_discards_remaining_rows() -> Result<(), QueryHelperError> {
        let mut cursor = ResultSetCursor::new(sample());
        assert!(cursor.advance().await?);
        cursor.close().await?;
        assert!(cursor.is_closed());
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.advance().await.is_err());
        Ok(())
    }
}
