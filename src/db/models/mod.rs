pub mod icon_row;

pub use icon_row::{IconRow, RowFreshness, StoredIcon};
