pub mod model;
pub mod service;

pub use model::{BatchReport, FetchError, FetchErrorKind, FetchOutcome, FetchRequest, Record};
pub use service::FetchService;
