pub mod add;
pub mod delete;
pub mod exceptions;
pub mod list;
pub mod occurrence;
pub mod preview;
pub mod reconcile;
pub mod remind;
pub mod rule;
pub mod skip;
