//! String diffing and diff-match-patch text patches.

pub mod diff;
pub mod patch;

pub use diff::{diff_text, DiffOp, Edit};
pub use patch::{
    apply_patch_text, apply_patches, make_patch_text, make_patches, parse_patches,
    patches_to_text, TextPatch, TextPatchError,
};
