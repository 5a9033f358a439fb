pub mod api;
pub mod calc;
pub mod db;
pub mod store;
