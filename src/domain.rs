//! Domain module - comic entities, the upstream record, and service ports

pub mod comic;
pub mod repositories;
pub mod services;
pub mod xkcd_record;

// Re-export commonly used items
pub use comic::{Comic, ExcludedComics, FetchRange, NewComic, extract_image_file_name, image_key};
pub use repositories::ComicRepository;
pub use services::{ClientError, ComicSource, ImageSource, ObjectStore, ObjectStoreError};
pub use xkcd_record::XkcdRecord;
