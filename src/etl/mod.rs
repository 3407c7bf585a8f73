pub mod model;
pub mod service;

pub use model::{EtlError, EtlReport};
pub use service::EtlService;
