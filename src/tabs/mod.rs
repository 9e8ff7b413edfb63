mod adapter;
mod host;

pub use adapter::SiteAdapter;
pub use host::{HostError, TabHost, TabNotice};
