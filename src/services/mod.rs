pub mod engine;
pub mod locks;
pub mod progress;
pub mod recalculation;
pub mod updater;

pub use engine::{RatingEngine, SubmittedReview};
pub use recalculation::{CancelFlag, RecalculationOrchestrator, RecalculationReport};
pub use updater::ItemRatingUpdater;
