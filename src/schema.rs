//! Reference relational layout for a SQL-backed event store.
//!
//! The crate ships no SQL driver; this is the table a relational
//! [`EventStore`](crate::storage::EventStore) is expected to manage. Lookups go
//! through `(requestor_id, throttle_id)` and pruning through `when`.

/// MySQL DDL for an event table named `table`.
///
/// Backticks inside the name are doubled so the identifier stays quoted.
pub fn create_table_sql(table: &str) -> String {
    let table = table.replace('`', "``");
    format!(
        "CREATE TABLE `{table}` (
    `id` int unsigned NOT NULL AUTO_INCREMENT,
    `requestor_id` varchar(255) NOT NULL,
    `throttle_id` varchar(255) NOT NULL,
    `when` INT UNSIGNED NOT NULL,
    PRIMARY KEY (`id`),
    INDEX idx_requestor_throttle (`requestor_id`, `throttle_id`),
    INDEX idx_when (`when`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_layout() {
        let sql = create_table_sql("throttle_events");
        assert!(sql.starts_with("CREATE TABLE `throttle_events`"));
        assert!(sql.contains("`requestor_id` varchar(255) NOT NULL"));
        assert!(sql.contains("`when` INT UNSIGNED NOT NULL"));
        assert!(sql.contains("idx_requestor_throttle (`requestor_id`, `throttle_id`)"));
        assert!(sql.contains("idx_when (`when`)"));
    }

    #[test]
    fn test_create_table_sql_quotes_backticks() {
        let sql = create_table_sql("bad`name");
        assert!(sql.starts_with("CREATE TABLE `bad``name`"));
    }
}
