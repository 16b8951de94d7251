pub mod chapter_store;
pub mod course_store;
pub mod json_fs;
pub mod model;
pub mod queue;
pub mod server;
