//! Services module - diagram state, persistence pipeline, collaboration and generation.

pub mod autosave;
pub mod collaboration;
pub mod diagram_service;
pub mod editor;
pub mod generation_service;
pub mod identity_resolver;
pub mod jwt_service;
pub mod session;

// Re-export for convenience
pub use autosave::{AutosaveScheduler, SaveNotice, SaveOutcome, SaveStatus};
pub use collaboration::{
    CollaborationChannel, CollaborationEvent, CollaborationHub, CollaborationMessage,
    CollaborationTransport,
};
pub use diagram_service::{ChangeListener, ChangeOrigin, DiagramChange, DiagramService};
pub use editor::{EditorError, EditorSession, LocalDraftMirror};
pub use generation_service::{
    ConversationExchange, GenerationAdapter, GenerationClient, GenerationError,
    GenerationRequest, HttpGenerationClient, LlmService,
};
pub use identity_resolver::{IdentityResolver, Resolution, ResolutionSource};
pub use jwt_service::{Claims, JwtService, SharedJwtService};
pub use session::AuthSession;
