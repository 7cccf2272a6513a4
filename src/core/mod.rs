pub mod docker;
pub mod config;
pub mod probe;
pub mod functional;
pub mod plan;
pub mod report;
pub mod store;
pub mod orchestrator;
pub mod health;

pub use docker::{ComposeCli, ContainerRuntime, ContainerStatusProbe, DockerEngine, UnreachableRuntime};
pub use config::{DotEnvFile, EnvironmentValidator, LayeredEnv, ProcessEnv};
pub use probe::{EndpointProbe, HttpProbe};
pub use orchestrator::{Orchestrator, ProgressObserver, Stage};
pub use report::{OverallStatus, ProbeResult, ProbeStatus, VerificationReport};
pub use store::ResultStore;
pub use health::HealthChecker;
