pub mod historical;
pub mod preferences;
pub mod price;
pub mod weather;
pub mod zone;

pub use historical::*;
pub use preferences::*;
pub use price::*;
pub use weather::*;
pub use zone::*;
