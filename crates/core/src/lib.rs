pub mod blank;
pub mod db;
pub mod error;
pub mod extract;
pub mod materialize;
pub mod models;
pub mod plan;
pub mod run;
pub mod video;

pub use crate::error::{Error, Result};
pub use crate::models::*;
