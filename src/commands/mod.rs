//! Subcommand entry points, one module per subcommand.
pub mod apply;
pub mod version;
