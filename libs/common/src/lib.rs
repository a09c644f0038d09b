pub mod id;
pub mod set;
pub mod snowflake;

pub use set::{Blank, Set};
pub use snowflake::SnowflakeGenerator;
