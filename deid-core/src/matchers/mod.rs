//! Compiled matcher machinery for the Safe Harbor pattern library.
//!
//! This module is responsible for compiling declarative [`crate::config::PatternRule`]s
//! into efficient regular expressions. Detection itself lives in
//! `detector`; this module only produces the compiled artifacts and caches
//! them across engine instances.
//!
//! This module works closely with `config` (for rule definitions),
//! `validators` (for programmatic match validation), and `spans` (for
//! result types).

pub mod compiler;
