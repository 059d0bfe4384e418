//! Applying filters, sorts, paging and grouping to records.

use std::cmp::Ordering;

use crate::filter::{Direction, Filter, FilterOp, Sort};
use crate::value::{Fields, Value};
use crate::view::Group;

/// Whether `record` passes `filter`.
///
/// A missing property matches only `is_empty`. A node with neither a
/// property nor children matches everything.
pub fn matches<R: Fields + ?Sized>(record: &R, filter: &Filter) -> bool {
    if !filter.and.is_empty() {
        return filter.and.iter().all(|f| matches(record, f));
    }
    if !filter.or.is_empty() {
        return filter.or.iter().any(|f| matches(record, f));
    }
    let Some(op) = filter.operator else {
        return true;
    };
    if filter.property.is_empty() {
        return true;
    }
    match record.field(&filter.property) {
        None => op == FilterOp::IsEmpty,
        Some(value) => apply(op, value, &filter.value),
    }
}

/// Whether `record` passes every filter of a list (an implicit `and`).
pub fn matches_all<R: Fields + ?Sized>(record: &R, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(record, f))
}

fn apply(op: FilterOp, value: &Value, operand: &Value) -> bool {
    match op {
        FilterOp::IsEmpty => value.is_empty(),
        FilterOp::IsNotEmpty => !value.is_empty(),
        FilterOp::Equals => value.compare(operand) == Ordering::Equal,
        FilterOp::NotEquals => value.compare(operand) != Ordering::Equal,
        FilterOp::GreaterThan => value.compare(operand) == Ordering::Greater,
        FilterOp::LessThan => value.compare(operand) == Ordering::Less,
        FilterOp::GreaterOrEqual => value.compare(operand) != Ordering::Less,
        FilterOp::LessOrEqual => value.compare(operand) != Ordering::Greater,
        FilterOp::Contains => contains(value, operand),
        FilterOp::NotContains => !contains(value, operand),
        FilterOp::StartsWith => lower(value).starts_with(&lower(operand)),
        FilterOp::EndsWith => lower(value).ends_with(&lower(operand)),
    }
}

fn lower(v: &Value) -> String {
    v.to_string().to_lowercase()
}

fn contains(value: &Value, operand: &Value) -> bool {
    let needle = lower(operand);
    match value {
        Value::List(items) => items.iter().any(|item| lower(item) == needle),
        other => lower(other).contains(&needle),
    }
}

/// Keep the records that pass every filter, in their original order.
pub fn evaluate<R: Fields>(records: Vec<R>, filters: &[Filter]) -> Vec<R> {
    if filters.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| matches_all(r, filters))
        .collect()
}

/// Stable multi-key sort; later keys break ties of earlier ones.
pub fn sort_records<R: Fields>(records: &mut [R], sorts: &[Sort]) {
    if sorts.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for sort in sorts {
            let va = a.field(&sort.property).unwrap_or(&Value::Null);
            let vb = b.field(&sort.property).unwrap_or(&Value::Null);
            let ord = match sort.direction {
                Direction::Asc => va.compare(vb),
                Direction::Desc => vb.compare(va),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Contiguous slice starting at `offset`. A `limit` of zero means no limit;
/// an offset past the end yields nothing.
pub fn page<R>(records: Vec<R>, offset: usize, limit: usize) -> Vec<R> {
    let take = if limit == 0 { usize::MAX } else { limit };
    records.into_iter().skip(offset).take(take).collect()
}

/// Records sharing one value of the grouping property.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordGroup<R> {
    pub key: Value,
    pub records: Vec<R>,
}

/// Bucket records by the first group's property.
///
/// Buckets keep the order in which their key first appears. Keys listed in
/// the group's `hidden` set are dropped. With no groups everything lands in
/// a single bucket keyed by null.
pub fn group_records<R: Fields>(records: Vec<R>, groups: &[Group]) -> Vec<RecordGroup<R>> {
    let Some(group) = groups.first() else {
        return vec![RecordGroup {
            key: Value::Null,
            records,
        }];
    };

    let mut buckets: Vec<RecordGroup<R>> = Vec::new();
    for record in records {
        let key = record.field(&group.property).cloned().unwrap_or_default();
        if group.hidden.iter().any(|h| h.compare(&key) == Ordering::Equal) {
            continue;
        }
        match buckets
            .iter_mut()
            .find(|b| b.key.compare(&key) == Ordering::Equal)
        {
            Some(bucket) => bucket.records.push(record),
            None => buckets.push(RecordGroup {
                key,
                records: vec![record],
            }),
        }
    }
    buckets
}
