pub mod display;
pub mod error;
pub mod traits;
pub mod types;

pub use display::*;
pub use error::*;
pub use traits::*;
pub use types::*;
