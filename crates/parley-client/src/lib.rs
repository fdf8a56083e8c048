//! Client side of parley.
//!
//! Frames decoded from the server stream are applied to a [`Session`] by the
//! [`MessageReconstructor`]; finished or in-flight assistant messages are
//! passed through the [`ContentRouter`], which sends large content to the
//! single-slot [`ContentPanel`].
#![allow(missing_docs)]

mod panel;
mod reconstructor;
mod router;
mod session;
mod transport;

pub use panel::{ContentPanel, ContentPanelItem, PanelItemType, PanelState};
pub use reconstructor::{MessageReconstructor, TurnOutcome, TurnProgress};
pub use router::{
    placeholder, preview, ContentExtractor, ContentRouter, Extraction, MarkerExtractor,
    RoutedMessage,
};
pub use session::{Session, SessionError, SessionStatus};
pub use transport::{ChatClient, TransportError};
