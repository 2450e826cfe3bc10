//! ORDER BY for claim candidates.
//!
//! Only whitelisted column names ever reach the SQL text.

use docket_core::scheduling::{SortField, SortOrder, SortSpec};

fn column(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "created_at",
        SortField::Priority => "priority",
        SortField::Id => "id",
        SortField::Attempts => "attempts",
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

/// `"<column> <dir>, id ASC"`; ties always break on the oldest id.
pub(crate) fn order_by(sort: SortSpec) -> String {
    match sort.field {
        SortField::Id => format!("id {}", direction(sort.order)),
        field => format!("{} {}, id ASC", column(field), direction(sort.order)),
    }
}
