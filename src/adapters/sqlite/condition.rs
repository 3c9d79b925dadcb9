//! Translation of [`QueryCondition`] into SQL.
//!
//! Every query reads from the target table aliased `t`, joined to the
//! run-id directory aliased `r`. Values are always bound, never spliced.

use sqlx::{QueryBuilder, Sqlite};

use crate::domain::event::{IdFilter, QueryCondition, SortColumn, TimestampFilter};

/// Appends `WHERE`, `ORDER BY` and `LIMIT` clauses for the condition.
pub fn push_condition(builder: &mut QueryBuilder<'_, Sqlite>, condition: &QueryCondition) {
    push_filters(builder, condition);
    push_order(builder, condition);
    if let Some(limit) = condition.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, condition: &QueryCondition) {
    let mut first = true;
    let mut next = |builder: &mut QueryBuilder<'_, Sqlite>| {
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    match &condition.id {
        Some(IdFilter::Exact(id)) => {
            next(builder);
            builder.push("t.id = ").push_bind(*id);
        }
        Some(IdFilter::Between(from, to)) => {
            next(builder);
            builder
                .push("t.id BETWEEN ")
                .push_bind(*from)
                .push(" AND ")
                .push_bind(*to);
        }
        None => {}
    }

    match &condition.timestamp {
        Some(TimestampFilter::From(from)) => {
            next(builder);
            builder.push("t.timestamp >= ").push_bind(from.clone());
        }
        Some(TimestampFilter::Between(from, to)) => {
            next(builder);
            builder
                .push("t.timestamp BETWEEN ")
                .push_bind(from.clone())
                .push(" AND ")
                .push_bind(to.clone());
        }
        None => {}
    }

    if let Some(series) = &condition.series {
        next(builder);
        builder.push("t.series = ").push_bind(series.clone());
    }

    // An unknown run resolves to NULL and matches nothing.
    if let Some(run_id) = &condition.run_id {
        next(builder);
        builder
            .push("t.runid = (SELECT id FROM runids WHERE runid = ")
            .push_bind(run_id.as_str().to_string())
            .push(")");
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, condition: &QueryCondition) {
    if condition.order.is_empty() {
        builder.push(" ORDER BY t.id ASC");
        return;
    }
    builder.push(" ORDER BY ");
    for (i, (column, direction)) in condition.order.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder
            .push(column_sql(*column))
            .push(" ")
            .push(direction.as_sql());
    }
}

fn column_sql(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Id => "t.id",
        SortColumn::Timestamp => "t.timestamp",
        SortColumn::Series => "t.series",
        SortColumn::RunId => "r.runid",
    }
}
