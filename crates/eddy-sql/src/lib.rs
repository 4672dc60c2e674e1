//! # Eddy SQL
//!
//! Statement parsing for the Eddy streaming SQL engine.
//!
//! This crate turns a script into [`ParsedStatement`]s. Each one keeps its
//! exact text and holds a [`Statement`], a closed set of statement kinds:
//!
//! ```sql
//! CREATE STREAM pageviews (viewtime BIGINT, pageid VARCHAR)
//!   WITH (KAFKA_TOPIC = 'pageviews', VALUE_FORMAT = 'JSON');
//!
//! CREATE TABLE views_per_page AS
//!   SELECT pageid, COUNT(*) FROM pageviews GROUP BY pageid;
//!
//! DROP STREAM pageviews DELETE TOPIC;
//! ```
//!
//! Identifiers are upper-cased unless quoted. Column types are mapped to
//! Arrow types at parse time.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod parser;
pub mod types;

pub use parser::{
    parse_statement, parse_statements, AliasedRelation, ColumnDefinition, ParseError,
    ParsedStatement, SelectStatement, SourceKind, SourceProperties, Statement, ValueFormat,
};
