pub mod load;
pub mod user;
