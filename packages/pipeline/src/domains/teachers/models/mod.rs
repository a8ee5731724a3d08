pub mod teacher;

pub use teacher::{SubscriptionPlan, TeacherAccount};
