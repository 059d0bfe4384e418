//! Query engine for Strata tables.
//!
//! Records are maps from property name to [`Value`]. A table declares its
//! columns as a list of [`Property`]s; filters, sorts and groups are checked
//! against that schema before they run, and then applied in memory with no
//! planner.
//!
//! # Key Types
//!
//! - [`Property`] / [`PropertyType`] -- the declared schema
//! - [`Value`] / [`RecordData`] -- dynamically typed record payloads
//! - [`Filter`] / [`FilterOp`] -- boolean filter trees
//! - [`Sort`] / [`Group`] -- ordering and bucketing
//! - [`View`] -- a saved query; [`Query`] -- the part that selects and orders
//!
//! # Design Rules
//!
//! 1. Validation happens before evaluation; evaluation never fails.
//! 2. Filter lists nest at most [`MAX_FILTER_DEPTH`] levels.
//! 3. Sorting is stable, so equal keys keep table order.
//! 4. Ad-hoc filters or sorts replace a view's, field by field.

pub mod coerce;
pub mod error;
pub mod eval;
pub mod filter;
pub mod schema;
pub mod value;
pub mod view;

pub use coerce::{coerce_record_data, coerce_value};
pub use error::{QueryError, QueryResult};
pub use eval::{
    evaluate, group_records, matches, matches_all, page, sort_records, RecordGroup,
};
pub use filter::{
    validate_filters, validate_sorts, Direction, Filter, FilterOp, Sort, MAX_FILTER_DEPTH,
};
pub use schema::{find_property, validate_schema, Property, PropertyType, SelectOption};
pub use value::{Fields, RecordData, Value};
pub use view::{resolve_query, validate_groups, Group, Query, View, ViewColumn, ViewType};
