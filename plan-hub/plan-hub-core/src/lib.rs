pub mod access;
pub mod combined_id;
pub mod dependency;
pub mod directory;
pub mod error;
pub mod events;
pub mod history;
pub mod node;
pub mod patch;
pub mod service;
pub mod storage;
pub mod trash;
pub mod validator;

pub use error::{HubError, Result};
pub use service::{NodeService, ServiceConfig};
