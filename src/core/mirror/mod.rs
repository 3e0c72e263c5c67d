pub mod file_mirror;
pub mod folder_naming;

pub use file_mirror::{FileMirror, MirrorError, UploadAccepted};
pub use folder_naming::{sanitize_folder_name, FolderNaming};
