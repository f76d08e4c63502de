pub mod batch_writer;
pub mod db;
pub mod diff;
pub mod steam;
pub mod store;
