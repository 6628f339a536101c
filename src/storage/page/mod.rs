mod codec;
mod error;
mod hash_bucket;
mod hash_directory;
mod header;
mod layout;
mod manager;

pub use codec::FixedCodec;
pub use error::PageError;
pub use hash_bucket::{max_bucket_capacity, BucketView, BucketViewMut};
pub use hash_directory::{HashDirectoryPage, DIRECTORY_ARRAY_SIZE, MAX_BUCKET_DEPTH};
pub use header::PageHeader;
pub use manager::PageManager;
