//! Database query functions organized by table.

pub mod meta;
pub mod subjects;
