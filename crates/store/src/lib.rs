//! The two logical databases (`private`, `shared`) plus the blob bucket.
//! Consumed as a transactional document store with indices and atomic
//! update operators — persistence itself is JSON-file-backed, in the style
//! of a single-node embedded store rather than a real database client.

mod blob;
mod doc_store;
mod private;
mod shared;

pub use blob::{BlobStore, FsBlobStore};
pub use doc_store::{DocEvent, DocStore};
pub use private::PrivateStore;
pub use shared::SharedStore;
