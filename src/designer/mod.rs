//! The nursery designer: form input, the two-step generation workflow and
//! the view derived from their state.

pub mod cancel;
pub mod form;
pub mod prompts;
pub mod render;
pub mod result;
pub mod session;
pub mod workflow;

pub use form::{FormState, InputMode, SubjectCategory, VisualStyle};
pub use render::{PrimaryAction, View};
pub use result::ResultState;
pub use session::RoomDesigner;
pub use workflow::{SubmissionWorkflow, SubmitError};
