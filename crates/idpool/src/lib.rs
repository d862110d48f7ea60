#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod base32;
mod bloom;
mod error;
mod generator;
mod index;
mod queue;
mod rand;
#[cfg(feature = "redis")]
mod redis;
mod replenish;

pub use crate::bloom::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::index::*;
pub use crate::queue::*;
pub use crate::rand::*;
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
#[cfg(feature = "redis")]
pub use crate::redis::*;
pub use crate::replenish::*;
