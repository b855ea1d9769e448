//! Session orchestration: surfaces, control messages and navigation.
//!
//! - [`window_control`]: the [`Orchestrator`] event loop
//! - [`control`]: messages from the management UI
//! - [`navigation`]: redirecting the game back into the mirror
//! - [`title`]: weighted game surface titles

pub mod control;
pub mod navigation;
pub mod title;
pub mod window_control;

pub use control::{
    ControlChannel, ControlError, ControlMessage, ControlProcessor, ControlResponse,
    PendingControl, ToolDescriptor, DEFAULT_TOOL_INDEX,
};
pub use navigation::{local_url_with_params, NavigationDecision, NavigationGuard};
pub use title::{default_titles, TitlePicker, WeightedTitle};
pub use window_control::{event_channel, EventEnvelope, Orchestrator};
