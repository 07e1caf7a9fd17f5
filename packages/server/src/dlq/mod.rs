pub mod service;
pub mod stale;

pub use service::DlqService;
pub use stale::run_stale_content_sweeper;
