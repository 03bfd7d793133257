pub mod batch;
pub mod driver;
pub mod merge;
pub mod parsers;
pub mod registry;
pub mod report;
pub mod select;
pub mod store;
pub mod timeutil;
