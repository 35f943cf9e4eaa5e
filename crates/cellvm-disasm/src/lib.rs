pub mod analyze;
pub mod model;

pub use analyze::{analyze_entry, blocks, Analysis, Block, Edge, EdgeKind, Loc, Report};
pub use model::{load_dir, read_u8, Image};
