pub mod compiler;
pub mod config;
pub mod model;
pub mod openai;
pub mod submit;
pub mod table;
