pub mod plan;
pub mod settings;
pub mod view;
pub mod notification;
pub mod archive;
pub mod config;
pub mod backup;

pub use plan::*;
pub use settings::*;
pub use view::*;
pub use notification::*;
pub use archive::*;
pub use config::*;
pub use backup::*;
