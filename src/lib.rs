pub mod codec;
pub mod container;
pub mod storage;
pub mod table;
pub mod types;
pub mod utils;

pub use container::{NodeProperties, PstFile, PstSource, TableKind, name_map::NameKey};
pub use types::error::{PstError, Result};
pub use types::value::{PropertyType, PropertyValue};
