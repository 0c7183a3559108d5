//! Patch model, applicator, and wire codec.

pub mod apply;
pub mod codec;
pub mod types;

pub use apply::{apply, apply_all, apply_all_with, apply_in_place, apply_in_place_with, ApplyOptions};
pub use codec::{from_wire, to_wire, CodecError};
pub use types::{type_name, ApplyAllError, InsertPosition, Operation, Patch, PatchError};
