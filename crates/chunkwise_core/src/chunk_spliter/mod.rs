mod split_chunks;
pub use split_chunks::*;
