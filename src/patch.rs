//! JSON Patch vocabulary used by the injectors
//!
//! Every mutation is expressed as [`json_patch::PatchOperation`] values. Paths
//! are built from tokens so that special characters are escaped by `jsonptr`
//! instead of by hand.

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use serde::Serialize;

/// `/spec/volumes`
pub const VOLUMES_PATH: [&str; 2] = ["spec", "volumes"];

/// `/spec/initContainers`
pub const INIT_CONTAINERS_PATH: [&str; 2] = ["spec", "initContainers"];

/// `/spec/containers`
pub const CONTAINERS_PATH: [&str; 2] = ["spec", "containers"];

/// Token appending to the end of an existing array
pub const APPEND_TOKEN: &str = "-";

/// Build an `add` operation at the pointer made of `tokens`
pub fn add<'a, T: Serialize>(
    tokens: impl IntoIterator<Item = &'a str>,
    value: &T,
) -> Result<PatchOperation, serde_json::Error> {
    Ok(PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(tokens),
        value: serde_json::to_value(value)?,
    }))
}

/// Build a `replace` operation at the pointer made of `tokens`
pub fn replace<'a, T: Serialize>(
    tokens: impl IntoIterator<Item = &'a str>,
    value: &T,
) -> Result<PatchOperation, serde_json::Error> {
    Ok(PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(tokens),
        value: serde_json::to_value(value)?,
    }))
}
