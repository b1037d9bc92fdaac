pub mod error;
pub mod settings;
pub mod traits;
pub mod types;

pub use error::*;
pub use settings::*;
pub use traits::*;
pub use types::*;
