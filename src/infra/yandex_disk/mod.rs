pub mod yandex_disk_client;

pub use yandex_disk_client::{YandexDiskClient, DEFAULT_BASE_URL};
