pub mod device;
pub mod recorder;
pub mod report;
