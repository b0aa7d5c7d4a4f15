mod link_table;

pub use link_table::*;
