#![forbid(unsafe_code)]

pub mod account_service;
pub mod app_services;
pub mod completion_service;
pub mod error;
pub mod session_service;

pub use training_core::Clock;

pub use account_service::{AccountService, RepairOutcome};
pub use app_services::AppServices;
pub use completion_service::{CompletionOutcome, CompletionService};
pub use error::{AppServicesError, Resource, ServiceError};
pub use session_service::SessionService;
