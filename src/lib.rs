//! # vectorforge
//!
//! Build local semantic-search vector stores from heterogeneous document
//! sources: a filesystem tree, a remote Git repository, or a wiki space.
//!
//! One pipeline run flows raw inputs through format-dispatched parsing,
//! batched embedding against an HTTP endpoint, and flat exact-index
//! construction, then persists the result as a uniquely named store
//! directory:
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌───────────────┐
//! │ Collectors │──▶│ Parser   │──▶│ Embedding │──▶│ Flat L2 index │
//! │ FS/Git/Wiki│   │ registry │   │ client    │   │ + metadata    │
//! └────────────┘   └──────────┘   └───────────┘   └──────┬────────┘
//!                                                        ▼
//!                                          stores/<name>/{index.vec,
//!                                             metadata.json, run.log}
//! ```
//!
//! Vector ids are assigned `0..n-1` in embed order and join the index to
//! the metadata table; the two artifacts form one logical table.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`document`] | `Document` and `RawInput` value types |
//! | [`parser`] | Format parser registry |
//! | [`connector_fs`] | Filesystem collector |
//! | [`connector_git`] | Git repository collector |
//! | [`connector_wiki`] | Wiki space collector |
//! | [`embedding`] | Batched HTTP embedding client |
//! | [`store`] | Flat L2 index build/persist/open |
//! | [`pipeline`] | End-to-end orchestration |

pub mod config;
pub mod connector_fs;
pub mod connector_git;
pub mod connector_wiki;
pub mod document;
pub mod embedding;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod sources;
pub mod store;
