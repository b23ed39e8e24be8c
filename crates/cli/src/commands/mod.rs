pub mod dataset;
pub mod monitor;
pub mod predict;
pub mod status;
