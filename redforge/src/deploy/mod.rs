//! Deployment pipeline: compilers, tool execution and orchestration

pub mod baseline;
pub mod compiler;
pub mod configurator;
pub mod credentials;
pub mod executor;
pub mod fsm;
pub mod lease;
pub mod mesh;
pub mod orchestrator;
pub mod reconciler;
pub mod variables;

pub use executor::{Executor, ProcessRunner, RunContext, ToolRunner};
pub use fsm::{DeploymentEvent, DeploymentStatus};
pub use orchestrator::{Orchestrator, PipelineHandle};
