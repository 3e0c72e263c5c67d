// The core module contains all business logic.
// Each feature gets its own submodule. Nothing in here knows about Discord,
// Google or Yandex; the infra layer plugs those in through the traits below.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "extraction/mod.rs"]
pub mod extraction;

#[path = "parsing/mod.rs"]
pub mod parsing;

#[path = "sheets/mod.rs"]
pub mod sheets;

#[path = "mirror/mod.rs"]
pub mod mirror;

#[path = "history/mod.rs"]
pub mod history;

#[path = "ingest/mod.rs"]
pub mod ingest;
