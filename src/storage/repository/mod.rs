pub mod crew_repo;

pub use crew_repo::{CrewRepository, PersistenceError, UpsertStats};
