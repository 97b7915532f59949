pub mod content_entry;
pub mod logical_file;
