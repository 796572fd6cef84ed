//! Object Store
//!
//! The narrow slice of the Kubernetes API the storage controllers need:
//! typed get/list/create/delete, JSON merge patches on objects and their
//! status subresource, and Kubernetes Event publishing.
//!
//! # Example
//!
//! ```no_run
//! use object_store::{KubeStore, ResourceStore};
//! use crds::FileShare;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let shares = KubeStore::<FileShare>::namespaced(client);
//!
//! if let Some(share) = shares.get(Some("team-a"), "data").await? {
//!     println!("ready: {}", share.is_ready());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **test-util**: `MockStore` and `RecordingEventPublisher` for unit tests

pub mod error;
pub mod events;
pub mod kube_store;
pub mod merge;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::StoreError;
pub use events::{EventPublisher, KubeEventPublisher};
pub use kube_store::KubeStore;
pub use store_trait::{label_selector, ResourceStore};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{InjectedFailure, MockOp, MockStore, RecordedEvent, RecordingEventPublisher};
