pub mod claim;
pub mod config;
pub mod error;
pub mod requests;
pub mod schema;

pub use claim::*;
pub use config::*;
pub use error::*;
pub use requests::*;
pub use schema::*;
