pub mod domain;
pub mod http;
pub mod nats;
pub mod postgres;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockArtifactStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCommandPublisher;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeadLetterQueue;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDecisionRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockImageRecognizer;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockVehicleStatusRepository;
