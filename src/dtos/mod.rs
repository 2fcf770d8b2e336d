mod affiliatedtos;
mod downlinedtos;
mod reportdtos;

pub use affiliatedtos::*;
pub use downlinedtos::*;
pub use reportdtos::*;
