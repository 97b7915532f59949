pub mod display_name;
pub mod media_type;
