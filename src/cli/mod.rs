//! CLI command handling

pub mod ingest;
pub mod list;
pub mod output;
pub mod prefs;
pub mod run;
pub mod settings;

pub use ingest::*;
pub use list::*;
pub use output::*;
pub use prefs::*;
pub use run::*;
pub use settings::*;
