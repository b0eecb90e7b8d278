//! Built-in content-processing units.

mod commands;
mod contents;
mod group;

pub use commands::{DocumentUnit, MetaUnit, ReceiptUnit};
pub use contents::{ArrayUnit, CustomizedHandler, CustomizedUnit, FileUnit, ForwardUnit};
pub use group::GroupUnit;
