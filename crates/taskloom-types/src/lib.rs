mod archive;
mod classified;
mod indexing;
mod skeleton;
mod time;
mod util;

pub use archive::*;
pub use classified::*;
pub use indexing::*;
pub use skeleton::*;
pub use time::*;
pub use util::*;

/// System-wide normalised-prefix length, in code points.
///
/// Extraction (parent side) and matching (child side) must use the same
/// value or exact-prefix resolution silently stops working.
pub const PREFIX_LENGTH: usize = 192;

/// Minimum instruction length, in graphemes. Anything shorter is treated
/// as noise: discarded on the parent side, root-detected on the child side.
pub const MIN_INSTRUCTION_GRAPHEMES: usize = 10;
