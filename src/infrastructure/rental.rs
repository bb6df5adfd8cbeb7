mod memory;
mod reservation;
mod vehicle;

pub use self::memory::*;
pub use self::reservation::*;
pub use self::vehicle::*;
