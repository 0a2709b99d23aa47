pub mod blob;
pub mod builtin_templates;
pub mod config;
pub mod constants;
pub mod gen_stream;
pub mod message;
pub mod output;
pub mod serializer;
pub mod store;
pub mod studio;
