pub mod db;
pub mod worker;
