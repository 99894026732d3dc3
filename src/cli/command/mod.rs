pub mod convert;
pub mod inspect;

pub use convert::convert;
pub use inspect::inspect;
