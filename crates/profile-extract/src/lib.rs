//! profile-extract — resilient extraction of person and organization records
//! from authenticated, dynamically rendered profile pages.

pub mod config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod loader;
pub mod orchestrator;
pub mod renderer;
pub mod section;
pub mod selectors;
pub mod session;
pub mod types;

pub use config::ExtractorConfig;
pub use error::{ConfigError, ExtractError};
pub use gate::ConcurrencyGate;
pub use guard::GuardDetector;
pub use loader::PageLoader;
pub use orchestrator::{ExtractionOrchestrator, TaskStage};
pub use section::SectionParser;
pub use selectors::{SelectorCatalog, SelectorChain, SelectorStrategy};
pub use session::{Session, SessionFactory};
pub use types::*;
