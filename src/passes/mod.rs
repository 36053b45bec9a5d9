//! Tree rewrite passes, in pipeline order.
//!
//! Each pass is a visitor over an oxc [`Program`](oxc_ast::ast::Program)
//! living in a caller-owned arena. It takes the arena and the program by
//! `&mut`, replaces the nodes it recognises with ones built in the same
//! arena, and returns how many rewrites it made. Passes are idempotent:
//! running one on its own output changes nothing.

pub mod concat;
pub mod decode;
pub mod inline;
pub mod rest_params;

pub use concat::fold_string_concats;
pub use decode::{HELPER_NAME, append_decode_helper, canonicalize_decoders};
pub use inline::inline_decode_wrappers;
pub use rest_params::normalize_rest_params;
