// Application layer - Job controllers and the registry facade

pub mod download_job;
pub mod registry;
pub mod scan_job;
