pub mod indexed;
pub mod path;

pub use indexed::{IndexedPath, PathSegment};
pub use path::{as_wikilink, link_target, normalize_folder, VaultPath};
