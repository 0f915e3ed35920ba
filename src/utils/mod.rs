//! Shared utility functions.

pub mod json_extraction;

pub use json_extraction::{
    extract_json_object, extract_largest_json_object, find_matching_brace,
    try_extract_json_from_response, JsonExtractionError, JsonExtractionResult,
};
