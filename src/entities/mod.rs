pub mod movie;
pub mod preference;
