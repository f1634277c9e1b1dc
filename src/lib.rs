mod annotation_service;
mod detection;
mod labels;
mod model_service;
mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod annotate;
pub mod app;
pub mod config;

pub use annotation_service::{AnnotationError, AnnotationService};
pub use app::start_app;
pub use detection::Detection;
pub use labels::ClassLabels;
pub use model_service::{ModelError, ModelService};
pub use ort_service::OrtModelService;
pub use server::{build_router, SharedState};
pub use telemetry::Metrics;
