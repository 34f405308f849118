// fluxsql module structure
// sql: parsing, translation and the streaming execution engine
// datasource: uniform adapters over files, databases and stdin
// output: newline-JSON result serialization

pub mod datasource;
pub mod output;
pub mod sql;
