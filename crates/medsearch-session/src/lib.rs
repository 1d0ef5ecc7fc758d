//! medsearch-session: Client-side session logic for search threads and paper chat.
//! - Cancellable thread polling (`poller`)
//! - Optimistic submit → create → search → poll chain (`session`)
//! - Persisted UI context: sidebar, active thread, source selection, chat (`store`)
//! - Per-paper chat history (`paper_chat`)

pub mod error;
pub mod poller;
pub mod session;
pub mod store;
pub mod paper_chat;

pub use error::SessionError;
pub use poller::{PollConfig, PollHandle, PollOutcome, ThreadPoller};
pub use session::{DisplayMessage, SearchSession, SessionPhase};
pub use store::{ChatContext, SessionState, SessionStore};
pub use paper_chat::PaperChatSession;
