//! Traits at the boundary between the protocol core and the data model

mod from_data;

pub use from_data::{decode_with_serde, optional_snowflake, required_snowflake, FromData};
