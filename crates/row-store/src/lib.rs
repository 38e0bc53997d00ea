//! Schema-bound ticker table layered over a plain grid of string cells.
//!
//! `SheetRowStore` owns the column schema and the key rules; a `SheetBackend`
//! only knows how to read, append, clear and delete rows of cells.

pub mod backend;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use backend::SheetBackend;
pub use memory::MemorySheet;
pub use schema::{decode_row, encode_row, header_matches, COLUMNS};
pub use sqlite::SqliteSheet;
pub use store::SheetRowStore;
