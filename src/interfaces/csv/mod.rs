//! Batch interface: operations in, final account states out.

pub mod account_writer;
pub mod operation_reader;
