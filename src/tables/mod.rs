//! Tabular inputs and outputs: canonical results, alias overrides, decoder
//! snapshots and assembled matches.

pub mod aliases;
pub mod output;
pub mod records;
pub mod results;
pub mod schema;

pub use aliases::{load_alias_table, read_alias_table};
pub use output::{output_gate, OutputGate};
pub use records::{read_csv, read_csv_counted, read_snapshots, write_csv, CsvRows};
pub use results::{CanonicalMatchResult, CanonicalResults, ResultsWindow};
pub use schema::{ColumnSchema, ResolvedColumns};
