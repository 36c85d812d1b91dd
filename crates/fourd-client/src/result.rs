//! Result sets and row access.

use std::sync::Arc;

use fourd_protocol::header::{ColumnDef, ResponseHeader, ResultKind};
use fourd_protocol::row::{RowBatch, RowSchema};
use fourd_protocol::types::Value;

/// One result row: decoded values keyed by field name.
///
/// Rows share their column-name list, so access by name costs a linear
/// scan over a handful of columns rather than a per-row map allocation.
#[derive(Debug, Clone)]
pub struct Row {
    names: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    /// Look up a value by field name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.values.get(idx)
    }

    /// Look up a value by position.
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Integer accessor, widening any integer wire type.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Floating-point accessor.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Text accessor.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Boolean accessor.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Column names, in wire order (including the synthetic record-number
    /// column when present).
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    /// Values, in wire order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Accumulated outcome of one statement execution.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Declared result kind.
    pub kind: ResultKind,
    /// Server-assigned statement id correlating fetch continuations.
    pub statement_id: Option<String>,
    /// Declared total row count of the full result.
    pub row_count: u64,
    /// Rows the server declared for the current page.
    pub row_count_sent: u64,
    /// Rows received so far for the current page.
    pub rows_received: u64,
    /// Declared fields, in order (without the synthetic record-number
    /// column).
    pub fields: Vec<ColumnDef>,
    /// Accumulated rows across all fetched pages.
    pub rows: Vec<Row>,
    /// Affected row count for Update-Count results, when declared.
    pub affected_rows: Option<u64>,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self {
            kind: ResultKind::UpdateCount,
            statement_id: None,
            row_count: 0,
            row_count_sent: 0,
            rows_received: 0,
            fields: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
        }
    }
}

impl ResultSet {
    /// Build a result set from a promoted response header.
    #[must_use]
    pub fn from_header(header: &ResponseHeader) -> Self {
        Self {
            kind: header.kind.clone(),
            statement_id: header.statement_id.clone(),
            row_count: header.row_count.unwrap_or(0),
            row_count_sent: header.row_count_sent.unwrap_or(0),
            rows_received: 0,
            fields: header.columns.clone(),
            rows: Vec::new(),
            affected_rows: header.affected_rows,
        }
    }

    /// Fold a continuation page's header into the accumulated result.
    ///
    /// Accumulated rows are kept; only the per-page counters and the page's
    /// declared schema are refreshed.
    pub fn apply_page_header(&mut self, header: &ResponseHeader) {
        self.row_count_sent = header.row_count_sent.unwrap_or(0);
        self.rows_received = 0;
        if !header.columns.is_empty() {
            self.fields = header.columns.clone();
        }
        if header.statement_id.is_some() {
            self.statement_id = header.statement_id.clone();
        }
    }

    /// Merge a decoded row batch into the accumulated rows.
    pub fn merge_batch(&mut self, batch: RowBatch, schema: &RowSchema) {
        let names = Arc::new(
            schema
                .columns
                .iter()
                .map(|c| c.name.clone())
                .collect::<Vec<_>>(),
        );
        self.rows_received += batch.rows.len() as u64;
        self.rows.extend(
            batch
                .rows
                .into_iter()
                .map(|values| Row::new(Arc::clone(&names), values)),
        );
    }

    /// Whether a FETCH-RESULT continuation is required: the current page
    /// arrived in full but the declared total has not been reached.
    #[must_use]
    pub fn needs_fetch(&self) -> bool {
        self.rows_received == self.row_count_sent && (self.rows.len() as u64) < self.row_count
    }

    /// Whether the declared total row count has been reached.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.rows.len() as u64 >= self.row_count
    }

    /// Number of accumulated rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fourd_protocol::header::HeaderBlock;
    use fourd_protocol::types::WireType;

    fn header(src: &str) -> ResponseHeader {
        ResponseHeader::from_block(&HeaderBlock::parse(src.as_bytes()).unwrap()).unwrap()
    }

    fn page_header(total: u64, sent: u64) -> ResponseHeader {
        header(&format!(
            "0000000001 OK\r\nResultType:Result-Set\r\nStatementID:9\r\nCommandCount:1\r\n\
             RowCount:{total}\r\nRowCount-Sent:{sent}\r\nColumn-Types:VK_LONG\r\n\
             Column-Aliases:[n]\r\nColumn-Updateability:N"
        ))
    }

    fn batch_of(values: &[i32]) -> RowBatch {
        RowBatch {
            rows: values.iter().map(|v| vec![Value::Long(*v)]).collect(),
            consumed: values.len() * 5,
        }
    }

    #[test]
    fn test_pagination_accounting() {
        let first = page_header(5, 2);
        let schema = RowSchema::from_header(&first);
        let mut rs = ResultSet::from_header(&first);

        rs.merge_batch(batch_of(&[1]), &schema);
        // Page not yet fully received: no fetch, not complete.
        assert!(!rs.needs_fetch());
        assert!(!rs.is_complete());

        rs.merge_batch(batch_of(&[2]), &schema);
        assert!(rs.needs_fetch());
        assert!(!rs.is_complete());

        rs.apply_page_header(&page_header(5, 3));
        assert_eq!(rs.rows_received, 0);
        assert_eq!(rs.len(), 2);

        rs.merge_batch(batch_of(&[3, 4, 5]), &schema);
        assert!(!rs.needs_fetch());
        assert!(rs.is_complete());
        assert_eq!(rs.len(), 5);
    }

    #[test]
    fn test_zero_row_result_is_complete() {
        let rs = ResultSet::from_header(&page_header(0, 0));
        assert!(rs.is_complete());
        assert!(!rs.needs_fetch());
    }

    #[test]
    fn test_row_accessors() {
        let names = Arc::new(vec!["id".to_string(), "name".to_string()]);
        let row = Row::new(
            names,
            vec![Value::Long(7), Value::String("seven".to_string())],
        );
        assert_eq!(row.get_i64("id"), Some(7));
        assert_eq!(row.get_str("name"), Some("seven"));
        assert!(row.get("missing").is_none());
        assert_eq!(row.get_at(0), Some(&Value::Long(7)));
    }

    #[test]
    fn test_fields_promoted() {
        let rs = ResultSet::from_header(&page_header(1, 1));
        assert_eq!(rs.fields.len(), 1);
        assert_eq!(rs.fields[0].name, "n");
        assert_eq!(rs.fields[0].wire_type, WireType::Long);
    }
}
