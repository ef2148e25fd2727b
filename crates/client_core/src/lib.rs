//! Chat core: transcript state, turn orchestration, and the model seam.

pub mod attachments;
pub mod gemini;
pub mod model;
pub mod session;
pub mod transcript;

pub use attachments::{load_image, load_images, AttachmentError};
pub use gemini::{GeminiClient, GeminiConfig};
pub use model::{DeltaStream, GenerativeModel, MissingGenerativeModel};
pub use session::{ChatSession, SessionError, SessionEvent, TurnOutcome};
pub use transcript::{PendingAttachments, SessionState, Transcript};
