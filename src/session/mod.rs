pub mod context;
pub mod pages;

pub use context::SessionContext;
pub use pages::PageStack;
