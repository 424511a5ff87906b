mod connection;
mod driver;
mod extract;
mod sql_writer;

pub use connection::*;
pub use driver::*;
pub use sql_writer::*;
