//! medsearch-api: Typed clients for the search, thread, library and paper-chat gateways.
//!
//! Every gateway sits behind an `async_trait` seam so the session layer can be
//! driven by [`HttpApi`] in production and by in-memory fakes in tests.

pub mod error;
pub mod identity;
pub mod backend;
pub mod http;
pub mod threads;
pub mod search;
pub mod library;
pub mod library_search;
pub mod paper_chat;

pub use backend::{LibraryBackend, PaperChatBackend, SearchBackend, SessionBackend, ThreadBackend};
pub use error::ApiError;
pub use http::{ApiEndpoints, ApiKeys, HttpApi};
pub use identity::{IdentityProvider, StaticIdentity};
pub use library_search::search_library;
