pub mod accessibility;
pub mod controller;
pub mod state;

pub use accessibility::{Accessibility, NoScreenReader, RecordingAccessibility};
pub use controller::{CompletionCallback, InterstitialController};
pub use state::{
    announcement_text, should_announce, CountdownState, InterstitialSession,
    InterstitialVariant, TickOutcome, EMPTY_GOALS_TEXT, MAX_GOALS,
};
