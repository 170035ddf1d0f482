pub mod actions;
pub mod download;
pub mod manager;
pub mod selector;
pub mod state;

pub use download::{final_download_name, CompletedDownload};
pub use manager::{BrowserSession, LaunchOptions, Viewport};
pub use selector::Selector;
pub use state::StorageState;
