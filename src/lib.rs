pub mod aggregate;
pub mod allocate;
pub mod cumulative;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod shift;
