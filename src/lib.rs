pub mod aggregate;
pub mod memory;
pub mod models;
pub mod pg;
pub mod report;
pub mod store;
pub mod sync;
