mod models;
mod schema;
mod store;

pub use models::{Album, AlbumWithSongs, Page, Song};
pub use store::{SqliteCatalogStore, MAX_PAGE_SIZE};
