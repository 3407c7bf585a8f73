pub mod crew_member;

pub use crew_member::Entity as CrewMember;
