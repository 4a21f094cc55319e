//! Bound-parameter arithmetic for batched statements.

/// Maximum number of bound parameters SQLite accepts in one statement.
pub const SQLITE_VAR_LIMIT: usize = 999;

/// Number of rows that fit in one statement when each row binds `fields` parameters.
///
/// Never less than one, so a single row is always expressible.
pub fn batch_capacity(fields: usize) -> usize {
    (SQLITE_VAR_LIMIT / fields.max(1)).max(1)
}

/// Split `items` into chunks of whole rows that stay within [`SQLITE_VAR_LIMIT`].
pub fn chunks_for<T>(items: &[T], fields: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_capacity(fields))
}

/// `(?, ?, ...)` row tuples joined by commas, `rows` times.
pub(crate) fn row_placeholders(rows: usize, fields: usize) -> String {
    let tuple = format!("({})", vec!["?"; fields].join(", "));
    vec![tuple.as_str(); rows].join(", ")
}
