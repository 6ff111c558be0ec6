#![doc = include_str!("../README.md")]

extern crate self as sqlx_fragment_template;

pub use sqlx_fragment_template_macro::*;

pub mod db_adapter;
mod error;
mod expand;
mod mock;
pub mod placeholder;
mod registry;
mod sql_template_execute;
mod statement;
mod value;
pub use db_adapter::{BindValue, DBType, DecodeValue, RowMap};
pub use error::*;
pub use expand::*;
pub use mock::*;
pub use placeholder::param_keys;
pub use registry::*;
pub use sql_template_execute::*;
pub use statement::*;
pub use value::*;
