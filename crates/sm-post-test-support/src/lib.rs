//! Shared test doubles for the social media post service.

mod clock;
mod publisher;
mod repository;

pub use clock::FixedClock;
pub use publisher::{FailingPublisher, PublishedMessage, RecordingPublisher};
pub use repository::{
    AppendCall, EmptyEventRepository, FailingEventRepository, RecordingEventRepository,
};
