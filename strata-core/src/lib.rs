mod accessor;
mod config;
mod connection;
mod constraint;
mod driver;
mod entity;
mod error;
mod join;
mod result;
mod routine;
mod sql_writer;
mod table_ref;
mod util;
mod value;

pub use accessor::*;
pub use config::*;
pub use connection::*;
pub use constraint::*;
pub use driver::*;
pub use entity::*;
pub use error::*;
pub use join::*;
pub use result::*;
pub use routine::*;
pub use sql_writer::*;
pub use table_ref::*;
pub use util::*;
pub use value::*;

pub use ::anyhow::Context as ErrorContext;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
