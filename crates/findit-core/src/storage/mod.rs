//! Two-tier persistence substrate (§4.6): an authoritative per-folder
//! SQLite database plus an aggregated, re-derivable global query index.
//!
//! [`folder_db`] owns the authoritative rows for one registered folder.
//! [`global_db`] mirrors clip rows from every folder, keyed by
//! `(source_folder, source_clip_id)`, alongside an FTS5 virtual table used
//! by the search engine. [`sync`] is the one-way folder-db → global-db
//! replication triggered after each layer transition.

pub mod folder_db;
pub mod global_db;
pub mod model;
pub mod sync;

pub use folder_db::FolderDb;
pub use global_db::{FacetCounts, FtsHit, GlobalDb, GlobalFullRow};
pub use model::*;
pub use sync::sync_clip;
