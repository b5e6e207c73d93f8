//! Infrastructure layer - Provider adapters, routing and workflow execution

pub mod credentials;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod routing;
pub mod workflow;
