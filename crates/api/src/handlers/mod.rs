pub mod presence;
pub mod users;
