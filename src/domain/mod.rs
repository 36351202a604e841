pub mod document;
pub mod examples;
pub mod hooks;
pub mod modifier;
pub mod query;
pub mod schema;
