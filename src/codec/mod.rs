pub mod canonical;

pub use canonical::{canonical_json, canonical_object_without, sort_json_value};
