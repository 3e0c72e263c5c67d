// The infra module contains implementations of core traits.
// Each external service gets its own submodule.

#[path = "ai/mod.rs"]
pub mod ai;

#[path = "attachments/mod.rs"]
pub mod attachments;

#[path = "google_sheets/mod.rs"]
pub mod google_sheets;

#[path = "history/mod.rs"]
pub mod history;

#[path = "settings/mod.rs"]
pub mod settings;

#[path = "yandex_disk/mod.rs"]
pub mod yandex_disk;
