//! Active-region tracking and finger-gesture recognition for a virtual
//! touch bar: a strip of a camera image is tracked as a control surface and
//! two/three-finger swipes over it drive volume and brightness.

pub mod actions;
pub mod config;
pub mod ema;
pub mod error;
pub mod gestures;
pub mod input;
pub mod pipeline;
pub mod region;
pub mod tracker;

pub use error::{Error, Result};
