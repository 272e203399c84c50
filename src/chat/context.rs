//! Digest of current site content sent along with each chat turn

use crate::error::StoreError;
use crate::plan::ContentTable;
use crate::store::{ContentStore, Query};

/// List the most recent rows of every content table as `id: label` lines,
/// so the assistant can target existing records by id.
pub async fn site_content(store: &dyn ContentStore, rows_per_table: usize) -> Result<String, StoreError> {
    let mut out = String::new();
    if rows_per_table == 0 {
        return Ok(out);
    }

    let query = Query::new()
        .order_by("created_at", true)
        .limit(rows_per_table);

    for table in ContentTable::ALL {
        let records = store.select_many(table, &query).await?;
        if records.is_empty() {
            continue;
        }

        out.push_str(&format!("## {}\n", table));
        for record in records {
            out.push_str(&format!("- {}: {}\n", record.id, record.label()));
        }
        out.push('\n');
    }

    Ok(out)
}
