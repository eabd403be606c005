//! Root crate has no library code of its own — all real logic lives in
//! `crates/*`. This file exists only to satisfy the package manifest's
//! `[lib]` target during the migration to a pure workspace layout.
