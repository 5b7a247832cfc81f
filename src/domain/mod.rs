pub mod canonical;
pub mod cell;
pub mod digest;
pub mod error;
pub mod fix;
pub mod memory;
pub mod outcome;
pub mod ports;
pub mod report;
pub mod table_spec;
pub mod value_objects;
