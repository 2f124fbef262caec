pub mod args;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod errors;

pub use args::{ArgValue, ToolArgs};
pub use catalog::{Catalog, Operation, ParamKind, ParamSpec, ToolDescriptor};
pub use config::{AppConfig, BitrixAuth, ConfigError, LoadOptions, LogFormat, Transport};
pub use entity::{CalendarOperation, EntitySpec, ProjectOperation, TaskAction};
pub use errors::ArgumentError;
