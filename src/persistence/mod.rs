//! Persistence primitives: ordered key-value stores, Fjall backend, and the
//! index manifest.

mod fjall_store;
mod kv;
mod manifest;
mod provider;

pub use fjall_store::FjallStore;
pub use kv::{KvPair, KvStore, MemoryStore};
pub use manifest::{IndexManifest, ManifestEntry, ManifestHolder, MANIFEST_FILE};
pub use provider::StoreProvider;
