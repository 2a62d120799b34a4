mod offset_table;
mod ref_id;

pub use offset_table::*;
pub use ref_id::*;
