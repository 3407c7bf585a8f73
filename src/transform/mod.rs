pub mod processors;
pub mod wookiee;

pub use processors::{probe, probe_id, CrewRecord, TransformMode, TransformWarning, Transformer};
pub use wookiee::wookiee_encode;
